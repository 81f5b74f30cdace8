//! Configuration system.
//!
//! Loads teleop configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

use crate::math::{CoordinateConversion, Vec3};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeleopConfig {
    /// Pose socket URL (client), e.g. `wss://192.168.1.112:8765`.
    pub ws_url: String,
    /// Base URL of the asset server (client). No scene population when unset.
    #[serde(default)]
    pub asset_base_url: Option<String>,
    /// Path of the body list endpoint.
    #[serde(default = "default_bodies_path")]
    pub bodies_path: String,
    /// Path of a body mesh; `{name}` is replaced by the body id.
    #[serde(default = "default_mesh_path")]
    pub mesh_path: String,
    /// Accept self-signed certificates on HTTPS and WSS.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Offset added to every inbound body position.
    #[serde(default = "default_initial_shift")]
    pub initial_shift: [f32; 3],
    /// Scene entity mirroring the dominant-hand controller.
    #[serde(default = "default_marker_id")]
    pub marker_id: String,
    /// Device -> canonical change of basis, as rows.
    #[serde(default = "default_to_canonical")]
    pub to_canonical: [[f32; 4]; 4],
    /// Server listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// PEM certificate for `wss` (server only).
    #[serde(default)]
    pub tls_cert: Option<String>,
    /// PEM PKCS#8 key matching `tls_cert` (server only).
    #[serde(default)]
    pub tls_key: Option<String>,
    /// Bodies driven by the demo handler (server only).
    #[serde(default)]
    pub follow_bodies: Vec<String>,
}

fn default_bodies_path() -> String {
    "/bodies".to_string()
}

fn default_mesh_path() -> String {
    "/stl/{name}.stl".to_string()
}

fn default_initial_shift() -> [f32; 3] {
    [-1.0, 0.0, 1.0]
}

fn default_marker_id() -> String {
    "rightControllerFrame".to_string()
}

fn default_to_canonical() -> [[f32; 4]; 4] {
    CoordinateConversion::WEBXR_TO_CANONICAL_ROWS
}

fn default_listen_addr() -> String {
    "127.0.0.1:8765".to_string()
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8765".to_string(),
            asset_base_url: None,
            bodies_path: default_bodies_path(),
            mesh_path: default_mesh_path(),
            accept_invalid_certs: false,
            initial_shift: default_initial_shift(),
            marker_id: default_marker_id(),
            to_canonical: default_to_canonical(),
            listen_addr: default_listen_addr(),
            tls_cert: None,
            tls_key: None,
            follow_bodies: Vec::new(),
        }
    }
}

impl TeleopConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn conversion(&self) -> CoordinateConversion {
        CoordinateConversion::from_rows(self.to_canonical)
    }

    pub fn initial_shift(&self) -> Vec3 {
        Vec3::from(self.initial_shift)
    }

    /// Full URL of the body list.
    pub fn bodies_url(&self) -> Option<String> {
        self.asset_base_url
            .as_deref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), self.bodies_path))
    }

    /// Asset path of a body mesh, relative to `asset_base_url`.
    pub fn mesh_path_for(&self, body: &str) -> String {
        self.mesh_path.replace("{name}", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_fills_defaults() {
        let cfg = TeleopConfig::from_json_str(r#"{"ws_url": "wss://10.0.0.2:8765"}"#).unwrap();
        assert_eq!(cfg.ws_url, "wss://10.0.0.2:8765");
        assert_eq!(cfg.initial_shift, [-1.0, 0.0, 1.0]);
        assert_eq!(cfg.marker_id, "rightControllerFrame");
        assert_eq!(cfg.conversion(), CoordinateConversion::webxr_to_canonical());
        assert!(cfg.bodies_url().is_none());
    }

    #[test]
    fn asset_urls() {
        let cfg = TeleopConfig {
            asset_base_url: Some("https://10.0.0.2:5000/".to_string()),
            ..TeleopConfig::default()
        };
        assert_eq!(cfg.bodies_url().as_deref(), Some("https://10.0.0.2:5000/bodies"));
        assert_eq!(cfg.mesh_path_for("Moving Jaw"), "/stl/Moving Jaw.stl");
    }
}
