//! `teleop_server`
//!
//! Server-side systems:
//! - WebSocket listener (plain or TLS)
//! - Per-connection request/response loop: controller frame in, body poses out
//! - Pluggable [`handler::TeleopHandler`] with a clutch-style demo handler

pub mod handler;
pub mod server;

pub use handler::{FollowHandler, TeleopHandler};
pub use server::PoseServer;
