//! Headless teleop client binary.
//!
//! Usage:
//!   cargo run -p teleop_client -- [--config teleop.json] [--ws wss://host:8765]
//!       [--assets https://host:5000] [--insecure] [--sim-controllers]
//!
//! Populates an in-memory scene from the asset server and runs the pose relay
//! until the socket closes. `--sim-controllers` mounts two tracked
//! controllers so the request/response loop runs without XR hardware.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use teleop_client::{
    connection::ConnectionManager,
    populate::{apply_scene_event, HttpBodySource, SceneEvent, ScenePopulator},
    relay::{PoseRelay, RelayConfig, RelayEvent, RelayState},
    scene::{Gamepad, Hand, SceneGraph},
};
use teleop_shared::{
    config::TeleopConfig,
    math::{Mat4, Vec3},
    net::Button,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

struct ClientArgs {
    cfg: TeleopConfig,
    sim_controllers: bool,
}

fn parse_args() -> anyhow::Result<ClientArgs> {
    let mut cfg = TeleopConfig::default();
    let mut sim_controllers = false;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                let text = std::fs::read_to_string(&args[i + 1])
                    .with_context(|| format!("read config {}", args[i + 1]))?;
                cfg = TeleopConfig::from_json_str(&text).context("parse config")?;
                i += 2;
            }
            "--ws" if i + 1 < args.len() => {
                cfg.ws_url = args[i + 1].clone();
                i += 2;
            }
            "--assets" if i + 1 < args.len() => {
                cfg.asset_base_url = Some(args[i + 1].clone());
                i += 2;
            }
            "--insecure" => {
                cfg.accept_invalid_certs = true;
                i += 1;
            }
            "--sim-controllers" => {
                sim_controllers = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(ClientArgs {
        cfg,
        sim_controllers,
    })
}

fn mount_sim_controllers(scene: &mut SceneGraph) {
    for (hand, x) in [(Hand::Left, -0.2), (Hand::Right, 0.2)] {
        scene.mount_controller(hand, Mat4::new_translation(&Vec3::new(x, 1.2, -0.3)));
        scene.set_gamepad(
            hand,
            Some(Gamepad {
                buttons: vec![Button::default(); 6],
                axes: vec![0.0; 4],
            }),
        );
    }
}

/// Relay errors are logged; the loop keeps running until the socket closes.
async fn handle_event(
    relay: &mut PoseRelay,
    event: RelayEvent,
    scene: &mut SceneGraph,
    conn: &mut ConnectionManager,
) {
    if let Err(e) = relay.handle(event, scene, conn).await {
        warn!(error = %format!("{e:#}"), "Relay event failed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let ClientArgs {
        cfg,
        sim_controllers,
    } = parse_args()?;
    info!(ws = %cfg.ws_url, assets = ?cfg.asset_base_url, "Starting client");

    let mut scene = SceneGraph::new();
    scene.add_entity(&cfg.marker_id);
    if sim_controllers {
        mount_sim_controllers(&mut scene);
    }

    // The populator runs on its own task; the scene is only touched here.
    let (scene_tx, mut scene_rx) = mpsc::channel::<SceneEvent>(64);
    let mut populating = match HttpBodySource::from_config(&cfg)? {
        Some(source) => {
            let populator = ScenePopulator::new(Arc::new(source), &cfg.mesh_path);
            tokio::spawn(populator.run(scene_tx));
            true
        }
        None => {
            info!("No asset server configured; scene stays empty");
            false
        }
    };

    let mut relay = PoseRelay::new(RelayConfig::from_config(&cfg));
    let mut conn = ConnectionManager::from_config(&cfg);
    let opened = conn.open().await;
    handle_event(&mut relay, opened, &mut scene, &mut conn).await;

    while relay.state() != RelayState::Closed {
        tokio::select! {
            event = conn.next_event() => {
                handle_event(&mut relay, event, &mut scene, &mut conn).await;
            }
            maybe = scene_rx.recv(), if populating => match maybe {
                Some(event) => apply_scene_event(&mut scene, event),
                None => populating = false,
            },
        }
    }

    info!(
        frames_sent = relay.frames_sent(),
        messages = relay.messages_received(),
        entities = scene.entity_count(),
        "Client stopped"
    );
    Ok(())
}
