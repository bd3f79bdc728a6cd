//! WebSocket transport: open the socket, run the handshake, pump inbound frames.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;

use crate::error::{ChatError, Result};
use crate::messages::{AuthenticateMessage, Event, Inbound};
use crate::protocol::{self, Frame};
use crate::queue::InboundSender;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Handshake path and query appended to the server URL.
pub const SOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Derive the socket URL from the HTTP(S) server URL.
pub fn socket_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}{SOCKET_PATH}")
}

/// The single outbound path of a socket. Every write, user message or
/// heartbeat, goes through the same lock so frames never interleave.
#[derive(Clone)]
pub struct OutboundWriter {
    inner: Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>,
}

impl std::fmt::Debug for OutboundWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundWriter").finish_non_exhaustive()
    }
}

impl OutboundWriter {
    pub async fn send_frame(&self, frame: String) -> Result<()> {
        let mut guard = self.inner.lock().await;
        tracing::trace!(%frame, "socket send");
        guard.send(Message::Text(frame)).await?;
        Ok(())
    }

    pub async fn send_event(&self, name: &str, payload: &Value) -> Result<()> {
        self.send_frame(protocol::encode_event(name, payload)).await
    }

    /// Send a close frame and flush.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.close().await?;
        Ok(())
    }
}

/// Read half of an open socket.
pub struct SocketReader {
    stream: SplitStream<WsStream>,
}

impl std::fmt::Debug for SocketReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketReader").finish_non_exhaustive()
    }
}

/// Open the socket and authenticate it: namespace connect, a short pause,
/// then the authenticate event carrying `token`.
pub async fn open(
    url: &str,
    token: &str,
    connect_timeout: Duration,
    handshake_delay: Duration,
) -> Result<(OutboundWriter, SocketReader)> {
    let (ws_stream, _) = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| ChatError::NetworkTimeout)??;
    let (sink, stream) = ws_stream.split();
    let writer = OutboundWriter {
        inner: Arc::new(tokio::sync::Mutex::new(sink)),
    };

    writer.send_frame(protocol::NAMESPACE_CONNECT.to_string()).await?;
    tokio::time::sleep(handshake_delay).await;
    let auth = protocol::encode("authenticate", &AuthenticateMessage { token })?;
    writer.send_frame(auth).await?;

    Ok((writer, SocketReader { stream }))
}

impl SocketReader {
    /// Read frames until the socket closes. Keepalive pings are answered
    /// in place; application events are pushed to `inbound` in arrival
    /// order; anything malformed is dropped.
    pub async fn pump(mut self, writer: &OutboundWriter, inbound: &InboundSender<Inbound>) -> Result<()> {
        while let Some(item) = self.stream.next().await {
            let text = match item? {
                Message::Text(t) => t,
                Message::Close(frame) => {
                    tracing::debug!(?frame, "socket closed by peer");
                    break;
                }
                _ => continue,
            };
            match protocol::decode(&text) {
                Some(Frame::Ping) => writer.send_frame(protocol::PONG.to_string()).await?,
                Some(Frame::Event { name, payload }) => {
                    tracing::debug!(event = %name, "event received");
                    inbound.push(Inbound::Event(Event::from_parts(name, payload)));
                }
                Some(Frame::Open(info)) => tracing::debug!(%info, "transport handshake acknowledged"),
                Some(Frame::Connected) => tracing::debug!("namespace connected"),
                Some(Frame::Pong) => {}
                Some(Frame::Disconnect) => {
                    tracing::debug!("namespace disconnected by peer");
                    break;
                }
                None => tracing::trace!(frame = %text, "dropping malformed frame"),
            }
        }
        Ok(())
    }
}
