//! Teleop handlers.
//!
//! A handler turns each controller frame into the body poses sent back to the
//! client. Handlers run one frame at a time.

use std::collections::BTreeMap;

use teleop_shared::{
    math::{Mat4, PoseDelta},
    net::{BodyPoses, ControllerFrame},
};
use tracing::debug;

/// Right-controller button that enables following.
pub const GRIP_BUTTON: usize = 5;

pub trait TeleopHandler: Send + 'static {
    fn on_frame(&mut self, frame: &ControllerFrame) -> anyhow::Result<BodyPoses>;
}

/// Moves a set of bodies with the right controller while the grip button is
/// held, clutch style: releasing the button freezes the bodies, and motion
/// made while released is not replayed.
#[derive(Debug, Default)]
pub struct FollowHandler {
    targets: BTreeMap<String, Mat4>,
    previous: Option<Mat4>,
}

impl FollowHandler {
    pub fn new<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: bodies
                .into_iter()
                .map(|b| (b.into(), Mat4::identity()))
                .collect(),
            previous: None,
        }
    }

    pub fn with_pose(mut self, body: impl Into<String>, pose: Mat4) -> Self {
        self.targets.insert(body.into(), pose);
        self
    }

    pub fn target(&self, body: &str) -> Option<&Mat4> {
        self.targets.get(body)
    }
}

impl TeleopHandler for FollowHandler {
    fn on_frame(&mut self, frame: &ControllerFrame) -> anyhow::Result<BodyPoses> {
        let current = frame.right_controller.matrix();

        if let Some(previous) = self.previous {
            if frame.right_controller.is_pressed(GRIP_BUTTON) {
                let delta = PoseDelta::between(&previous, &current);
                debug!(
                    dx = ?delta.translation,
                    rotvec = ?delta.rotation_vector(),
                    "Following controller"
                );
                for pose in self.targets.values_mut() {
                    *pose = delta.apply_to(pose);
                }
            }
        }
        self.previous = Some(current);

        let mut poses = BodyPoses::default();
        for (body, pose) in &self.targets {
            poses.insert(body.clone(), pose);
        }
        Ok(poses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use teleop_shared::{
        math::{mat4_to_columns_flat, Vec3},
        net::{Button, ControllerSnapshot},
    };

    fn frame_at(x: f32, grip: bool) -> ControllerFrame {
        let mut buttons = vec![Button::default(); 6];
        buttons[GRIP_BUTTON].pressed = grip;
        let snapshot = ControllerSnapshot {
            pose: mat4_to_columns_flat(&Mat4::new_translation(&Vec3::new(x, 0.0, 0.0))),
            buttons,
            axes: Vec::new(),
        };
        ControllerFrame {
            left_controller: snapshot.clone(),
            right_controller: snapshot,
        }
    }

    #[test]
    fn replies_with_every_target() {
        let mut handler = FollowHandler::new(["Base", "Jaw"]);
        let poses = handler.on_frame(&frame_at(0.0, false)).unwrap();
        assert_eq!(poses.len(), 2);
    }

    #[test]
    fn moves_only_while_gripped() {
        let mut handler = FollowHandler::new(["Jaw"]);
        handler.on_frame(&frame_at(0.0, false)).unwrap();
        handler.on_frame(&frame_at(0.5, true)).unwrap();
        handler.on_frame(&frame_at(2.0, false)).unwrap();
        handler.on_frame(&frame_at(2.25, true)).unwrap();

        let jaw = handler.target("Jaw").unwrap();
        assert_relative_eq!(jaw[(0, 3)], 0.75, epsilon = 1e-6);
    }

    #[test]
    fn first_frame_never_moves() {
        let start = Mat4::new_translation(&Vec3::new(0.0, 1.0, 0.0));
        let mut handler = FollowHandler::default().with_pose("Base", start);
        handler.on_frame(&frame_at(3.0, true)).unwrap();
        assert_eq!(handler.target("Base"), Some(&start));
    }
}
