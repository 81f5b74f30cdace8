//! Pose relay.
//!
//! Socket events are fed in as [`RelayEvent`]s; the relay applies inbound
//! body poses to the scene and answers each one with a fresh controller
//! frame. The client therefore never sends faster than the server replies.
//!
//! State machine: `Connecting -> Open -> Closed`. There is no reconnect.

use async_trait::async_trait;
use teleop_shared::{
    config::TeleopConfig,
    math::{CoordinateConversion, Transform, Vec3},
    net::{decode_poses, ControllerFrame},
};
use tracing::{debug, info, trace};

use crate::{
    input::build_frame,
    scene::{Hand, Scene},
};

/// Socket lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Handshake completed.
    Open,
    /// One inbound text message.
    Message(String),
    /// Socket closed, or failed to open.
    Close { reason: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    Open,
    Closed,
}

/// Outbound half of the socket.
#[async_trait]
pub trait FrameSink: Send {
    /// Frames sent while this is `false` are dropped.
    fn is_open(&self) -> bool;
    async fn send_frame(&mut self, frame: &ControllerFrame) -> anyhow::Result<()>;
}

/// Fixed parameters of the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub conversion: CoordinateConversion,
    /// Added to every inbound body position.
    pub initial_shift: Vec3,
    /// Entity that mirrors the right controller.
    pub marker_id: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_config(&TeleopConfig::default())
    }
}

impl RelayConfig {
    pub fn from_config(cfg: &TeleopConfig) -> Self {
        Self {
            conversion: cfg.conversion(),
            initial_shift: cfg.initial_shift(),
            marker_id: cfg.marker_id.clone(),
        }
    }
}

pub struct PoseRelay {
    cfg: RelayConfig,
    state: RelayState,
    frames_sent: u64,
    messages_received: u64,
}

impl PoseRelay {
    pub fn new(cfg: RelayConfig) -> Self {
        Self {
            cfg,
            state: RelayState::Connecting,
            frames_sent: 0,
            messages_received: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Handles one socket event.
    ///
    /// An inbound message that is not a valid pose map is returned as an
    /// error; nothing is applied or sent for it.
    pub async fn handle<S, K>(
        &mut self,
        event: RelayEvent,
        scene: &mut S,
        sink: &mut K,
    ) -> anyhow::Result<()>
    where
        S: Scene + ?Sized,
        K: FrameSink + ?Sized,
    {
        match event {
            RelayEvent::Open => {
                if self.state != RelayState::Connecting {
                    debug!(state = ?self.state, "Ignoring duplicate open");
                    return Ok(());
                }
                self.state = RelayState::Open;
                info!("WebSocket connection established");
                self.send_controllers(&*scene, sink).await?;
            }
            RelayEvent::Message(text) => {
                if self.state == RelayState::Closed {
                    debug!("Ignoring message after close");
                    return Ok(());
                }
                self.state = RelayState::Open;
                self.messages_received += 1;

                let updated = self.apply_poses(&text, scene)?;
                trace!(updated, "Body poses applied");

                if self.update_marker(scene) {
                    self.send_controllers(&*scene, sink).await?;
                }
            }
            RelayEvent::Close { reason } => {
                if self.state != RelayState::Closed {
                    info!(reason = reason.as_deref().unwrap_or(""), "WebSocket connection closed");
                }
                self.state = RelayState::Closed;
            }
        }
        Ok(())
    }

    /// Applies an inbound pose map. Returns how many bodies were found.
    ///
    /// Body matrices are row-major. Bodies missing from the scene are skipped.
    pub fn apply_poses<S: Scene + ?Sized>(
        &self,
        text: &str,
        scene: &mut S,
    ) -> anyhow::Result<usize> {
        let poses = decode_poses(text)?;
        let mut updated = 0;
        for (body, pose) in poses.iter() {
            let transform =
                Transform::decompose(&pose.to_matrix()).shifted(&self.cfg.initial_shift);
            if scene.set_transform(body, transform) {
                updated += 1;
            } else {
                trace!(body, "No entity for body");
            }
        }
        Ok(updated)
    }

    /// Mirrors the right controller's canonical pose onto the marker.
    ///
    /// Returns `false` unless both controllers are resolvable.
    fn update_marker<S: Scene + ?Sized>(&self, scene: &mut S) -> bool {
        if scene.controller(Hand::Left).is_none() {
            return false;
        }
        let Some(right) = scene.controller(Hand::Right) else {
            return false;
        };
        let display = Transform::decompose(&self.cfg.conversion.to_canonical(&right.matrix));
        scene.set_transform(&self.cfg.marker_id, display);
        true
    }

    async fn send_controllers<S, K>(&mut self, scene: &S, sink: &mut K) -> anyhow::Result<()>
    where
        S: Scene + ?Sized,
        K: FrameSink + ?Sized,
    {
        let Some(frame) = build_frame(scene, &self.cfg.conversion) else {
            debug!("Controllers not resolvable; nothing sent");
            return Ok(());
        };
        if !sink.is_open() {
            return Ok(());
        }
        sink.send_frame(&frame).await?;
        self.frames_sent += 1;
        Ok(())
    }
}
