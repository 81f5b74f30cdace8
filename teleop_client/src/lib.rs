//! `teleop_client`
//!
//! Client-side systems:
//! - Scene abstraction and an in-memory scene graph
//! - Scene population from the asset server
//! - Controller snapshots in the canonical frame
//! - The pose relay and its connection manager

pub mod connection;
pub mod input;
pub mod populate;
pub mod relay;
pub mod scene;

pub use connection::ConnectionManager;
pub use relay::{PoseRelay, RelayConfig, RelayEvent, RelayState};
