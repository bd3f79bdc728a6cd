//! Frame codec for the event-streaming protocol carried over the socket.
//!
//! Frames are text. The leading characters select the kind:
//!
//! | Prefix | Direction | Meaning |
//! |--------|-----------|---------|
//! | `0`    | in        | transport handshake acknowledgement |
//! | `2`    | in        | keepalive ping |
//! | `3`    | out       | keepalive reply |
//! | `40`   | both      | namespace connect (request out, acknowledgement in) |
//! | `41`   | in        | namespace disconnect |
//! | `42`   | both      | application event `[name, payload]` |
//!
//! Decoding never fails loudly: anything that does not match one of the
//! shapes above comes back as `None` and the read loop moves on.

use serde::Serialize;
use serde_json::Value;

/// Namespace connect request, sent right after the socket opens.
pub const NAMESPACE_CONNECT: &str = "40";
/// Keepalive ping sent by the peer.
pub const PING: &str = "2";
/// Reply to [`PING`].
pub const PONG: &str = "3";
/// Prefix of an application event frame.
pub const EVENT_PREFIX: &str = "42";

const OPEN_PREFIX: &str = "0";
const NAMESPACE_DISCONNECT: &str = "41";

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Transport handshake acknowledgement with its raw info blob.
    Open(String),
    Ping,
    Pong,
    /// Namespace connect acknowledgement.
    Connected,
    /// Peer left the namespace.
    Disconnect,
    /// Application event.
    Event { name: String, payload: Value },
}

/// Decode one text frame. Malformed frames yield `None`.
pub fn decode(text: &str) -> Option<Frame> {
    if let Some(body) = text.strip_prefix(EVENT_PREFIX) {
        return decode_event(body);
    }
    if text.starts_with(NAMESPACE_DISCONNECT) {
        return Some(Frame::Disconnect);
    }
    if text.starts_with(NAMESPACE_CONNECT) {
        return Some(Frame::Connected);
    }
    match text {
        PING => Some(Frame::Ping),
        PONG => Some(Frame::Pong),
        _ => text
            .strip_prefix(OPEN_PREFIX)
            .map(|info| Frame::Open(info.to_string())),
    }
}

fn decode_event(body: &str) -> Option<Frame> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::trace!(error = %e, "dropping event frame with invalid JSON");
            return None;
        }
    };
    let Value::Array(mut parts) = value else {
        return None;
    };
    if parts.len() != 2 {
        return None;
    }
    let payload = parts.pop()?;
    let Value::String(name) = parts.pop()? else {
        return None;
    };
    Some(Frame::Event { name, payload })
}

/// Encode an application event frame: `42["name",payload]`.
pub fn encode_event(name: &str, payload: &Value) -> String {
    let array = Value::Array(vec![Value::String(name.to_string()), payload.clone()]);
    format!("{EVENT_PREFIX}{array}")
}

/// Encode an application event from any serializable payload. Struct
/// fields keep their declaration order on the wire.
pub fn encode<T: Serialize>(name: &str, payload: &T) -> Result<String, serde_json::Error> {
    let array = serde_json::to_string(&(name, payload))?;
    Ok(format!("{EVENT_PREFIX}{array}"))
}
