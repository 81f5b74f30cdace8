//! Scene abstraction.
//!
//! The renderer and the XR runtime own the real scene graph; the relay and
//! the populator only need the narrow surface below. [`SceneGraph`] is an
//! in-memory implementation for the headless client and tests.

use std::collections::HashMap;

use bytes::Bytes;
use teleop_shared::{
    math::{Mat4, Transform},
    net::Button,
};

/// Which hand a controller is held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

/// Raw input device state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gamepad {
    pub buttons: Vec<Button>,
    pub axes: Vec<f32>,
}

/// A controller as currently tracked in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    /// Scene-frame transform of the controller object.
    pub matrix: Mat4,
    /// Absent until the physical device has been acquired.
    pub gamepad: Option<Gamepad>,
}

/// Opaque mesh payload; decoding is up to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub src: String,
    pub bytes: Bytes,
}

/// Scene surface used by the client.
pub trait Scene {
    /// Creates an entity tagged `id` whose mesh will come from `mesh_src`.
    fn spawn_body(&mut self, id: &str, mesh_src: &str);
    /// Attaches a loaded mesh. Returns `false` if the entity is gone.
    fn attach_mesh(&mut self, id: &str, mesh: Mesh) -> bool;
    /// Sets an entity's transform. Returns `false` if there is no such entity.
    fn set_transform(&mut self, id: &str, transform: Transform) -> bool;
    fn transform(&self, id: &str) -> Option<Transform>;
    /// Resolves a hand controller, if it is present in the scene.
    fn controller(&self, hand: Hand) -> Option<ControllerState>;
}

/// One entity in [`SceneGraph`].
#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub transform: Transform,
    pub mesh_src: Option<String>,
    pub mesh: Option<Mesh>,
}

/// In-memory scene.
#[derive(Debug, Default)]
pub struct SceneGraph {
    entities: HashMap<String, Entity>,
    controllers: HashMap<Hand, ControllerState>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity with no mesh (markers, helpers).
    pub fn add_entity(&mut self, id: &str) {
        self.entities.entry(id.to_string()).or_default();
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn mount_controller(&mut self, hand: Hand, matrix: Mat4) {
        self.controllers.insert(
            hand,
            ControllerState {
                matrix,
                gamepad: None,
            },
        );
    }

    pub fn unmount_controller(&mut self, hand: Hand) {
        self.controllers.remove(&hand);
    }

    /// Moves a mounted controller. No-op when unmounted.
    pub fn move_controller(&mut self, hand: Hand, matrix: Mat4) {
        if let Some(c) = self.controllers.get_mut(&hand) {
            c.matrix = matrix;
        }
    }

    /// Connects or disconnects a controller's input device.
    pub fn set_gamepad(&mut self, hand: Hand, gamepad: Option<Gamepad>) {
        if let Some(c) = self.controllers.get_mut(&hand) {
            c.gamepad = gamepad;
        }
    }
}

impl Scene for SceneGraph {
    fn spawn_body(&mut self, id: &str, mesh_src: &str) {
        let entity = self.entities.entry(id.to_string()).or_default();
        entity.mesh_src = Some(mesh_src.to_string());
    }

    fn attach_mesh(&mut self, id: &str, mesh: Mesh) -> bool {
        match self.entities.get_mut(id) {
            Some(entity) => {
                entity.mesh = Some(mesh);
                true
            }
            None => false,
        }
    }

    fn set_transform(&mut self, id: &str, transform: Transform) -> bool {
        match self.entities.get_mut(id) {
            Some(entity) => {
                entity.transform = transform;
                true
            }
            None => false,
        }
    }

    fn transform(&self, id: &str) -> Option<Transform> {
        self.entities.get(id).map(|e| e.transform)
    }

    fn controller(&self, hand: Hand) -> Option<ControllerState> {
        self.controllers.get(&hand).cloned()
    }
}
