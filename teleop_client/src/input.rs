//! Input handling.
//!
//! Turns the controllers currently tracked in the scene into the outbound
//! [`ControllerFrame`]. Snapshots are recomputed for every send and never
//! cached.

use teleop_shared::{
    math::{mat4_to_columns_flat, CoordinateConversion},
    net::{ControllerFrame, ControllerSnapshot},
};

use crate::scene::{ControllerState, Hand, Scene};

/// Samples one controller in the canonical frame.
///
/// A controller whose input device has not been acquired yet still reports
/// its pose, with empty `buttons` and `axes`.
pub fn build_snapshot(
    controller: &ControllerState,
    conversion: &CoordinateConversion,
) -> ControllerSnapshot {
    let pose = conversion.to_canonical(&controller.matrix);
    let (buttons, axes) = match &controller.gamepad {
        Some(pad) => (pad.buttons.clone(), pad.axes.clone()),
        None => (Vec::new(), Vec::new()),
    };
    ControllerSnapshot {
        pose: mat4_to_columns_flat(&pose),
        buttons,
        axes,
    }
}

/// Samples both controllers, or `None` unless both are resolvable.
pub fn build_frame<S: Scene + ?Sized>(
    scene: &S,
    conversion: &CoordinateConversion,
) -> Option<ControllerFrame> {
    let left = scene.controller(Hand::Left)?;
    let right = scene.controller(Hand::Right)?;
    Some(ControllerFrame {
        left_controller: build_snapshot(&left, conversion),
        right_controller: build_snapshot(&right, conversion),
    })
}
