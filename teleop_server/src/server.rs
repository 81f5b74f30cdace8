//! Pose server.
//!
//! Accepts WebSocket clients (optionally over TLS) and answers every
//! controller frame with the body poses produced by a [`TeleopHandler`].
//! One handler is shared by all connections; frames are processed one at a
//! time.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use teleop_shared::{
    config::TeleopConfig,
    net::{decode_frame, encode_poses},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task::JoinHandle,
};
use tokio_native_tls::TlsAcceptor;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};

use crate::handler::TeleopHandler;

pub struct PoseServer<H: TeleopHandler> {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    handler: Arc<Mutex<H>>,
}

impl<H: TeleopHandler> PoseServer<H> {
    /// Binds `listen_addr`; TLS is enabled when both `tls_cert` and `tls_key`
    /// are set.
    pub async fn bind(cfg: &TeleopConfig, handler: H) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.listen_addr.parse().context("parse listen_addr")?;
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;

        let tls = match (&cfg.tls_cert, &cfg.tls_key) {
            (Some(cert), Some(key)) => Some(load_tls(cert, key)?),
            (None, None) => None,
            _ => anyhow::bail!("tls_cert and tls_key must be set together"),
        };

        Ok(Self {
            listener,
            tls,
            handler: Arc::new(Mutex::new(handler)),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Shared handle to the handler, e.g. to inspect its state.
    pub fn handler(&self) -> Arc<Mutex<H>> {
        Arc::clone(&self.handler)
    }

    /// Accepts one TCP client and serves it on a background task.
    pub async fn accept_one(&self) -> anyhow::Result<JoinHandle<()>> {
        let (tcp, peer) = self.listener.accept().await.context("tcp accept")?;
        let tls = self.tls.clone();
        let handler = Arc::clone(&self.handler);
        Ok(tokio::spawn(async move {
            if let Err(e) = serve_tcp(tcp, peer, tls, handler).await {
                warn!(%peer, error = %format!("{e:#}"), "Connection failed");
            }
        }))
    }

    /// Serves clients until the listener fails. Per-connection accept errors
    /// are logged and skipped.
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.accept_one().await {
                Ok(_) => {}
                Err(e) if is_transient_accept_error(&e) => {
                    warn!(error = %format!("{e:#}"), "Accept failed");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Errors that concern a single pending connection, not the listener.
fn is_transient_accept_error(e: &anyhow::Error) -> bool {
    use std::io::ErrorKind::*;
    e.downcast_ref::<std::io::Error>().is_some_and(|io| {
        matches!(
            io.kind(),
            ConnectionAborted | ConnectionReset | ConnectionRefused | Interrupted | TimedOut | WouldBlock
        )
    })
}

fn load_tls(cert_path: &str, key_path: &str) -> anyhow::Result<TlsAcceptor> {
    let cert = std::fs::read(cert_path).with_context(|| format!("read {cert_path}"))?;
    let key = std::fs::read(key_path).with_context(|| format!("read {key_path}"))?;
    let identity = native_tls::Identity::from_pkcs8(&cert, &key).context("load tls identity")?;
    let acceptor = native_tls::TlsAcceptor::new(identity).context("build tls acceptor")?;
    Ok(TlsAcceptor::from(acceptor))
}

async fn serve_tcp<H: TeleopHandler>(
    tcp: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    handler: Arc<Mutex<H>>,
) -> anyhow::Result<()> {
    match tls {
        Some(acceptor) => {
            let stream = acceptor.accept(tcp).await.context("tls accept")?;
            let ws = accept_async(stream).await.context("ws handshake")?;
            serve_socket(ws, peer, handler).await
        }
        None => {
            let ws = accept_async(tcp).await.context("ws handshake")?;
            serve_socket(ws, peer, handler).await
        }
    }
}

/// Request/response loop for one client.
async fn serve_socket<S, H>(
    mut ws: WebSocketStream<S>,
    peer: SocketAddr,
    handler: Arc<Mutex<H>>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: TeleopHandler,
{
    info!(%peer, "Client connected");

    while let Some(msg) = ws.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                info!(%peer, error = %e, "Client disconnected");
                return Ok(());
            }
        };

        match msg {
            Message::Text(text) => {
                let frame = match decode_frame(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(%peer, error = %format!("{e:#}"), "Bad controller frame");
                        continue;
                    }
                };
                let poses = match handler.lock().await.on_frame(&frame) {
                    Ok(poses) => poses,
                    Err(e) => {
                        warn!(%peer, error = %format!("{e:#}"), "Handler failed");
                        continue;
                    }
                };
                ws.send(Message::text(encode_poses(&poses)?))
                    .await
                    .context("ws send")?;
            }
            Message::Close(_) => break,
            other => debug!(%peer, len = other.len(), "Ignoring non-text frame"),
        }
    }

    info!(%peer, "Client disconnected");
    Ok(())
}

/// Helper for tests: plain `ws://` server on an ephemeral port.
pub async fn bind_ephemeral<H: TeleopHandler>(
    handler: H,
) -> anyhow::Result<(PoseServer<H>, TeleopConfig)> {
    let mut cfg = TeleopConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..Default::default()
    };
    let server = PoseServer::bind(&cfg, handler).await?;
    let addr = server.local_addr()?;
    cfg.listen_addr = addr.to_string();
    cfg.ws_url = format!("ws://{addr}");
    Ok((server, cfg))
}
