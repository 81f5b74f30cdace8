//! Shared fixtures for the integration tests.

use teleop_client::scene::{Gamepad, Hand, SceneGraph};
use teleop_server::handler::GRIP_BUTTON;
use teleop_shared::{
    math::{Mat4, Vec3},
    net::Button,
};

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Controller pose at device-frame `x`, standing height.
pub fn controller_at(x: f32) -> Mat4 {
    Mat4::new_translation(&Vec3::new(x, 1.2, -0.3))
}

/// Scene with the given bodies, the marker entity and both controllers
/// mounted. The grip button is held on both when `grip` is set.
pub fn rigged_scene(bodies: &[&str], marker_id: &str, grip: bool) -> SceneGraph {
    let mut scene = SceneGraph::new();
    scene.add_entity(marker_id);
    for body in bodies {
        scene.add_entity(body);
    }
    for hand in [Hand::Left, Hand::Right] {
        scene.mount_controller(hand, controller_at(0.0));
        let mut buttons = vec![Button::default(); GRIP_BUTTON + 1];
        buttons[GRIP_BUTTON].pressed = grip;
        scene.set_gamepad(
            hand,
            Some(Gamepad {
                buttons,
                axes: vec![0.0; 4],
            }),
        );
    }
    scene
}
