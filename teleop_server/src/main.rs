//! Standalone pose server binary.
//!
//! Usage:
//!   cargo run -p teleop_server -- [--config teleop.json] [--addr 0.0.0.0:8765]
//!       [--cert cert.pem --key key.pem] [--follow <body>]...
//!
//! Answers each controller frame with the poses of the `--follow` bodies,
//! which track the right controller while its grip button is held.
//!
//! A self-signed pair for `wss` can be made with:
//!   openssl req -x509 -newkey rsa:4096 -keyout key.pem -out cert.pem -days 365 -nodes

use std::env;

use anyhow::Context;
use teleop_server::{handler::FollowHandler, server::PoseServer};
use teleop_shared::config::TeleopConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<TeleopConfig> {
    let mut cfg = TeleopConfig::default();
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
            "--addr" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--cert" if i + 1 < args.len() => {
                cfg.tls_cert = Some(args[i + 1].clone());
                i += 2;
            }
            "--key" if i + 1 < args.len() => {
                cfg.tls_key = Some(args[i + 1].clone());
                i += 2;
            }
            "--follow" if i + 1 < args.len() => {
                cfg.follow_bodies.push(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.listen_addr, bodies = ?cfg.follow_bodies, "Starting pose server");

    let handler = FollowHandler::new(cfg.follow_bodies.iter().cloned());
    let server = PoseServer::bind(&cfg, handler)
        .await
        .context("create server")?;
    let local = server.local_addr()?;
    let scheme = if server.is_tls() { "wss" } else { "ws" };
    info!(url = %format!("{scheme}://{local}"), "Server listening");

    server.run().await
}
