//! Wire protocol.
//!
//! Both directions are JSON text messages over one WebSocket:
//! - client -> server: [`ControllerFrame`], both hand controllers sampled at
//!   the same instant.
//! - server -> client: [`BodyPoses`], body id -> 4x4 matrix.
//!
//! Layouts differ by direction. A controller `pose` is 16 floats column by
//! column (the scene's native storage). A body matrix is row-major: either
//! nested rows or 16 floats row by row.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::math::{mat4_from_columns_flat, mat4_from_rows_flat, mat4_to_rows, Mat4};

/// One gamepad button.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Button {
    pub pressed: bool,
    pub value: f32,
}

/// One sampled instant of a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    /// Canonical-frame pose, column-major.
    pub pose: [f32; 16],
    pub buttons: Vec<Button>,
    pub axes: Vec<f32>,
}

impl ControllerSnapshot {
    pub fn matrix(&self) -> Mat4 {
        mat4_from_columns_flat(&self.pose)
    }

    /// Whether button `index` exists and is held.
    pub fn is_pressed(&self, index: usize) -> bool {
        self.buttons.get(index).is_some_and(|b| b.pressed)
    }
}

/// Outbound message: both controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerFrame {
    pub left_controller: ControllerSnapshot,
    pub right_controller: ControllerSnapshot,
}

/// A body matrix as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoseMatrix {
    Rows([[f32; 4]; 4]),
    Flat([f32; 16]),
}

impl PoseMatrix {
    pub fn from_matrix(m: &Mat4) -> Self {
        PoseMatrix::Rows(mat4_to_rows(m))
    }

    /// Interprets the payload row by row.
    pub fn to_matrix(&self) -> Mat4 {
        match self {
            PoseMatrix::Rows(rows) => Mat4::from_fn(|r, c| rows[r][c]),
            PoseMatrix::Flat(values) => mat4_from_rows_flat(values),
        }
    }
}

/// Inbound message: body id -> pose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyPoses(pub BTreeMap<String, PoseMatrix>);

impl BodyPoses {
    pub fn insert(&mut self, body: impl Into<String>, pose: &Mat4) {
        self.0.insert(body.into(), PoseMatrix::from_matrix(pose));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PoseMatrix)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn encode_frame(frame: &ControllerFrame) -> anyhow::Result<String> {
    serde_json::to_string(frame).context("serialize controller frame")
}

pub fn decode_frame(text: &str) -> anyhow::Result<ControllerFrame> {
    serde_json::from_str(text).context("deserialize controller frame")
}

pub fn encode_poses(poses: &BodyPoses) -> anyhow::Result<String> {
    serde_json::to_string(poses).context("serialize body poses")
}

pub fn decode_poses(text: &str) -> anyhow::Result<BodyPoses> {
    serde_json::from_str(text).context("deserialize body poses")
}
