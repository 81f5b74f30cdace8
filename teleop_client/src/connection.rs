//! Connection management.
//!
//! Owns the pose socket for its whole lifetime and translates it into
//! [`RelayEvent`]s. Frames go out as JSON text messages.

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use teleop_shared::{
    config::TeleopConfig,
    net::{encode_frame, ControllerFrame},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, Connector, MaybeTlsStream,
    WebSocketStream,
};
use tracing::{info, trace, warn};

use crate::relay::{FrameSink, RelayEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ConnectionManager {
    url: String,
    accept_invalid_certs: bool,
    stream: Option<WsStream>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, accept_invalid_certs: bool) -> Self {
        Self {
            url: url.into(),
            accept_invalid_certs,
            stream: None,
        }
    }

    pub fn from_config(cfg: &TeleopConfig) -> Self {
        Self::new(cfg.ws_url.clone(), cfg.accept_invalid_certs)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs the handshake. Yields `Open`, or `Close` with the failure.
    pub async fn open(&mut self) -> RelayEvent {
        info!(url = %self.url, "Connecting");
        match self.handshake().await {
            Ok(stream) => {
                self.stream = Some(stream);
                RelayEvent::Open
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Handshake failed");
                RelayEvent::Close {
                    reason: Some(format!("{e:#}")),
                }
            }
        }
    }

    async fn handshake(&self) -> anyhow::Result<WsStream> {
        let connector = if self.accept_invalid_certs {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .context("build tls connector")?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };
        let (stream, _response) =
            connect_async_tls_with_config(self.url.as_str(), None, false, connector)
                .await
                .with_context(|| format!("connect {}", self.url))?;
        Ok(stream)
    }

    /// Waits for the next inbound text message or the end of the socket.
    ///
    /// Once `Close` has been returned the socket is gone and every further
    /// call returns `Close` immediately.
    pub async fn next_event(&mut self) -> RelayEvent {
        let Some(stream) = self.stream.as_mut() else {
            return RelayEvent::Close { reason: None };
        };

        let event = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    break RelayEvent::Message(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(frame))) => {
                    break RelayEvent::Close {
                        reason: frame.map(|f| (*f.reason).to_owned()),
                    };
                }
                Some(Ok(other)) => {
                    trace!(len = other.len(), "Ignoring non-text frame");
                }
                Some(Err(e)) => {
                    break RelayEvent::Close {
                        reason: Some(e.to_string()),
                    };
                }
                None => break RelayEvent::Close { reason: None },
            }
        };

        if matches!(event, RelayEvent::Close { .. }) {
            // Push out the queued close reply before dropping the socket.
            let _ = stream.flush().await;
            self.stream = None;
        }
        event
    }

    /// Sends a close frame and drops the socket.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.close(None).await.context("ws close")?;
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSink for ConnectionManager {
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn send_frame(&mut self, frame: &ControllerFrame) -> anyhow::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let text = encode_frame(frame)?;
        stream.send(Message::text(text)).await.context("ws send")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unopened_manager_reports_closed() {
        let mut conn = ConnectionManager::new("ws://127.0.0.1:9", false);
        assert!(!conn.is_open());
        assert_eq!(conn.next_event().await, RelayEvent::Close { reason: None });
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn refused_handshake_yields_close() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut conn = ConnectionManager::new(format!("ws://127.0.0.1:{port}"), false);
        match conn.open().await {
            RelayEvent::Close { reason } => assert!(reason.is_some()),
            other => panic!("expected close, got {other:?}"),
        }
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn server_close_gets_close_reply() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Close(None)).await.unwrap();
            ws.next().await
        });

        let mut conn = ConnectionManager::new(format!("ws://{addr}"), false);
        assert_eq!(conn.open().await, RelayEvent::Open);
        assert!(matches!(conn.next_event().await, RelayEvent::Close { .. }));
        assert!(!conn.is_open());

        let reply = server.await.unwrap();
        assert!(matches!(reply, Some(Ok(Message::Close(_)))), "got {reply:?}");
    }
}
