//! `teleop_shared`
//!
//! Shared libraries used by both the teleop client and the pose server.
//!
//! Design goals:
//! - One definition of the wire format for both ends of the socket.
//! - Matrix conventions stated once (see [`math`]).
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
