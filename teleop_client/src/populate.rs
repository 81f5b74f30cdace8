//! Scene population.
//!
//! Fetches the list of robot bodies, creates one entity per body and loads
//! each body's mesh in the background. The populator never touches the scene
//! directly: it emits [`SceneEvent`]s that the owner of the scene applies with
//! [`apply_scene_event`].

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use teleop_shared::config::TeleopConfig;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::scene::{Mesh, Scene};

/// Where body names and meshes come from.
#[async_trait]
pub trait BodySource: Send + Sync {
    async fn list_bodies(&self) -> anyhow::Result<Vec<String>>;
    async fn fetch_mesh(&self, body: &str) -> anyhow::Result<Mesh>;
}

/// Body source backed by the asset server over HTTP(S).
pub struct HttpBodySource {
    client: reqwest::Client,
    base_url: String,
    bodies_path: String,
    mesh_path: String,
}

impl HttpBodySource {
    pub fn new(
        base_url: &str,
        bodies_path: &str,
        mesh_path: &str,
        accept_invalid_certs: bool,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bodies_path: bodies_path.to_string(),
            mesh_path: mesh_path.to_string(),
        })
    }

    /// Returns `None` when no asset server is configured.
    pub fn from_config(cfg: &TeleopConfig) -> anyhow::Result<Option<Self>> {
        cfg.asset_base_url
            .as_deref()
            .map(|base| {
                Self::new(
                    base,
                    &cfg.bodies_path,
                    &cfg.mesh_path,
                    cfg.accept_invalid_certs,
                )
            })
            .transpose()
    }

    fn mesh_src(&self, body: &str) -> String {
        self.mesh_path.replace("{name}", body)
    }
}

#[async_trait]
impl BodySource for HttpBodySource {
    async fn list_bodies(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}{}", self.base_url, self.bodies_path);
        let bodies = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .context("body list status")?
            .json::<Vec<String>>()
            .await
            .context("parse body list")?;
        Ok(bodies)
    }

    async fn fetch_mesh(&self, body: &str) -> anyhow::Result<Mesh> {
        let src = self.mesh_src(body);
        let url = format!("{}{}", self.base_url, src);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .context("mesh status")?
            .bytes()
            .await
            .context("read mesh body")?;
        Ok(Mesh { src, bytes })
    }
}

/// Scene mutations requested by the populator.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    SpawnBody { id: String, mesh_src: String },
    MeshLoaded { id: String, mesh: Mesh },
}

pub fn apply_scene_event<S: Scene + ?Sized>(scene: &mut S, event: SceneEvent) {
    match event {
        SceneEvent::SpawnBody { id, mesh_src } => {
            debug!(body = %id, src = %mesh_src, "Spawning body");
            scene.spawn_body(&id, &mesh_src);
        }
        SceneEvent::MeshLoaded { id, mesh } => {
            let len = mesh.bytes.len();
            if scene.attach_mesh(&id, mesh) {
                debug!(body = %id, bytes = len, "Mesh attached");
            } else {
                debug!(body = %id, "Mesh loaded for missing entity");
            }
        }
    }
}

/// Outcome of one populate run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub spawned: usize,
    pub meshes_loaded: usize,
}

/// Fills the scene from a [`BodySource`].
pub struct ScenePopulator {
    source: Arc<dyn BodySource>,
    mesh_path: String,
}

impl ScenePopulator {
    /// `mesh_path` is recorded on each spawned entity; `{name}` is the body id.
    pub fn new(source: Arc<dyn BodySource>, mesh_path: &str) -> Self {
        Self {
            source,
            mesh_path: mesh_path.to_string(),
        }
    }

    /// Lists bodies, requests one entity each and loads their meshes.
    ///
    /// A list failure is logged and ends the run with nothing spawned. A mesh
    /// failure only leaves that body without geometry. Returns once every
    /// mesh load has settled.
    pub async fn run(self, tx: mpsc::Sender<SceneEvent>) -> PopulateReport {
        let mut report = PopulateReport::default();

        let bodies = match self.source.list_bodies().await {
            Ok(bodies) => bodies,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Error loading bodies");
                return report;
            }
        };
        info!(count = bodies.len(), "Body list received");

        let mut loads = JoinSet::new();
        for body in bodies {
            let spawn = SceneEvent::SpawnBody {
                id: body.clone(),
                mesh_src: self.mesh_path.replace("{name}", &body),
            };
            if tx.send(spawn).await.is_err() {
                warn!("Scene closed during population");
                break;
            }
            report.spawned += 1;

            let source = Arc::clone(&self.source);
            let tx = tx.clone();
            loads.spawn(async move {
                match source.fetch_mesh(&body).await {
                    Ok(mesh) => tx
                        .send(SceneEvent::MeshLoaded { id: body, mesh })
                        .await
                        .is_ok(),
                    Err(e) => {
                        warn!(body = %body, error = %format!("{e:#}"), "Mesh load failed");
                        false
                    }
                }
            });
        }

        while let Some(done) = loads.join_next().await {
            if matches!(done, Ok(true)) {
                report.meshes_loaded += 1;
            }
        }

        info!(
            spawned = report.spawned,
            meshes = report.meshes_loaded,
            "Scene populated"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;
    use bytes::Bytes;
    use std::{collections::HashMap, sync::Mutex};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    struct FakeSource {
        bodies: Option<Vec<&'static str>>,
        broken_mesh: Option<&'static str>,
    }

    #[async_trait]
    impl BodySource for FakeSource {
        async fn list_bodies(&self) -> anyhow::Result<Vec<String>> {
            match &self.bodies {
                Some(list) => Ok(list.iter().map(|s| s.to_string()).collect()),
                None => anyhow::bail!("connection refused"),
            }
        }

        async fn fetch_mesh(&self, body: &str) -> anyhow::Result<Mesh> {
            if self.broken_mesh == Some(body) {
                anyhow::bail!("404");
            }
            Ok(Mesh {
                src: format!("/stl/{body}.stl"),
                bytes: Bytes::from_static(b"solid"),
            })
        }
    }

    async fn populate(source: impl BodySource + 'static) -> (PopulateReport, SceneGraph) {
        let (tx, mut rx) = mpsc::channel(64);
        let populator = ScenePopulator::new(Arc::new(source), "/stl/{name}.stl");
        let report = populator.run(tx).await;

        let mut scene = SceneGraph::new();
        while let Some(event) = rx.recv().await {
            apply_scene_event(&mut scene, event);
        }
        (report, scene)
    }

    #[tokio::test]
    async fn spawns_every_body_and_attaches_meshes() {
        let (report, scene) = populate(FakeSource {
            bodies: Some(vec!["Base", "Moving Jaw"]),
            broken_mesh: None,
        })
        .await;

        assert_eq!(
            report,
            PopulateReport {
                spawned: 2,
                meshes_loaded: 2
            }
        );
        let jaw = scene.entity("Moving Jaw").unwrap();
        assert_eq!(jaw.mesh_src.as_deref(), Some("/stl/Moving Jaw.stl"));
        assert!(jaw.mesh.is_some());
    }

    #[tokio::test]
    async fn failed_mesh_leaves_body_unrendered() {
        let (report, scene) = populate(FakeSource {
            bodies: Some(vec!["Base", "Wrist"]),
            broken_mesh: Some("Wrist"),
        })
        .await;

        assert_eq!(report.spawned, 2);
        assert_eq!(report.meshes_loaded, 1);
        assert!(scene.entity("Wrist").unwrap().mesh.is_none());
        assert!(scene.entity("Base").unwrap().mesh.is_some());
    }

    #[tokio::test]
    async fn list_failure_aborts_population() {
        let (report, scene) = populate(FakeSource {
            bodies: None,
            broken_mesh: None,
        })
        .await;

        assert_eq!(report, PopulateReport::default());
        assert_eq!(scene.entity_count(), 0);
    }

    type Routes = HashMap<&'static str, &'static [u8]>;

    /// Minimal HTTP/1.1 asset server. Unknown paths get a 404. Returns the
    /// base URL (with a trailing slash) and the request paths it has seen.
    async fn serve_assets(routes: Routes) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                tokio::spawn(answer(sock, Arc::clone(&routes), Arc::clone(&log)));
            }
        });
        (format!("http://{addr}/"), seen)
    }

    async fn answer(mut sock: TcpStream, routes: Arc<Routes>, seen: Arc<Mutex<Vec<String>>>) {
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match sock.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&chunk[..n]),
            }
        }
        let head = String::from_utf8_lossy(&request);
        let path = head.split_whitespace().nth(1).unwrap_or_default().to_string();
        let (status, body): (&str, &[u8]) = match routes.get(path.as_str()) {
            Some(body) => ("200 OK", *body),
            None => ("404 Not Found", &b"not found"[..]),
        };
        seen.lock().unwrap().push(path);

        let header = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = sock.write_all(header.as_bytes()).await;
        let _ = sock.write_all(body).await;
        let _ = sock.shutdown().await;
    }

    #[tokio::test]
    async fn http_source_populates_from_asset_server() {
        let routes = Routes::from([
            ("/bodies", &br#"["Base", "Moving Jaw"]"#[..]),
            ("/stl/Base.stl", &b"solid base"[..]),
            ("/stl/Moving%20Jaw.stl", &b"solid jaw"[..]),
        ]);
        let (base_url, seen) = serve_assets(routes).await;
        let source = HttpBodySource::new(&base_url, "/bodies", "/stl/{name}.stl", false).unwrap();

        let (report, scene) = populate(source).await;

        assert_eq!(
            report,
            PopulateReport {
                spawned: 2,
                meshes_loaded: 2
            }
        );
        let jaw = scene.entity("Moving Jaw").unwrap();
        assert_eq!(jaw.mesh_src.as_deref(), Some("/stl/Moving Jaw.stl"));
        let mesh = jaw.mesh.as_ref().unwrap();
        assert_eq!(mesh.src, "/stl/Moving Jaw.stl");
        assert_eq!(mesh.bytes.as_ref(), b"solid jaw");
        assert_eq!(
            scene.entity("Base").unwrap().mesh.as_ref().unwrap().bytes.as_ref(),
            b"solid base"
        );

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&"/bodies".to_string()), "{seen:?}");
    }

    #[tokio::test]
    async fn http_source_list_404_aborts_population() {
        let (base_url, seen) = serve_assets(Routes::new()).await;
        let source = HttpBodySource::new(&base_url, "/bodies", "/stl/{name}.stl", false).unwrap();

        let (report, scene) = populate(source).await;

        assert_eq!(report, PopulateReport::default());
        assert_eq!(scene.entity_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["/bodies".to_string()]);
    }
}
