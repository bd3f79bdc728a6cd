//! Application event types carried inside `42[...]` frames, and the items
//! delivered from the network side to the consumer tick.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::chats::{Chat, FriendsList};
use crate::notice::Notice;

/// Client → server: authenticate the socket with the login token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateMessage<'a> {
    pub token: &'a str,
}

/// Client → server: post a message to a chat.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: &'a str,
    pub message: &'a str,
    pub is_action: bool,
}

/// Chat message body inside a `new_message` event. Fields are read
/// leniently: nulls take their defaults and scalar values of the wrong
/// type are stringified, so a loose payload still yields a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "unknown_sender", deserialize_with = "lenient_sender")]
    pub sender: String,
    #[serde(rename = "message", default, deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_action: bool,
}

fn unknown_sender() -> String {
    "Unknown".to_string()
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn lenient_sender<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_else(unknown_sender))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(d)?, Value::Bool(true)))
}

#[derive(Debug, Clone, Deserialize)]
struct NewMessagePayload {
    chat_id: String,
    message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct UserPayload {
    username: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FriendRequestPayload {
    from: String,
}

/// One decoded application event; discriminator is the event name.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    NewMessage { chat_id: String, message: ChatMessage },
    UserOnline { username: String },
    UserOffline { username: String },
    FriendRequest { from: String },
    FriendAccepted { username: String },
    Heartbeat,
    /// Unknown kind, or a known kind whose payload did not fit its schema.
    Other { kind: String, payload: Value },
}

impl Event {
    /// Build an event from its wire name and payload. Never fails: payloads
    /// that do not match the schema of their kind pass through as `Other`.
    pub fn from_parts(kind: String, payload: Value) -> Self {
        let parsed = match kind.as_str() {
            "new_message" => serde_json::from_value::<NewMessagePayload>(payload.clone())
                .ok()
                .map(|p| Event::NewMessage {
                    chat_id: p.chat_id,
                    message: p.message,
                }),
            "user_online" => serde_json::from_value::<UserPayload>(payload.clone())
                .ok()
                .map(|p| Event::UserOnline { username: p.username }),
            "user_offline" => serde_json::from_value::<UserPayload>(payload.clone())
                .ok()
                .map(|p| Event::UserOffline { username: p.username }),
            "friend_request" => serde_json::from_value::<FriendRequestPayload>(payload.clone())
                .ok()
                .map(|p| Event::FriendRequest { from: p.from }),
            "friend_accepted" => serde_json::from_value::<UserPayload>(payload.clone())
                .ok()
                .map(|p| Event::FriendAccepted { username: p.username }),
            "heartbeat" => Some(Event::Heartbeat),
            _ => None,
        };
        parsed.unwrap_or(Event::Other { kind, payload })
    }

    /// Wire name of the event.
    pub fn kind(&self) -> &str {
        match self {
            Event::NewMessage { .. } => "new_message",
            Event::UserOnline { .. } => "user_online",
            Event::UserOffline { .. } => "user_offline",
            Event::FriendRequest { .. } => "friend_request",
            Event::FriendAccepted { .. } => "friend_accepted",
            Event::Heartbeat => "heartbeat",
            Event::Other { kind, .. } => kind,
        }
    }
}

/// Everything the network side hands to the consumer tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(Event),
    Notice(Notice),
    Friends(FriendsList),
    Chats(Vec<Chat>),
    ChatCreated(Chat),
    ChatRemoved(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_message_is_typed() {
        let event = Event::from_parts(
            "new_message".into(),
            json!({"chat_id": "c1", "message": {"sender": "bob", "message": "hi", "is_action": true}}),
        );
        assert_eq!(
            event,
            Event::NewMessage {
                chat_id: "c1".into(),
                message: ChatMessage {
                    sender: "bob".into(),
                    text: "hi".into(),
                    timestamp: None,
                    is_action: true,
                },
            }
        );
        assert_eq!(event.kind(), "new_message");
    }

    #[test]
    fn missing_sender_defaults_to_unknown() {
        let event = Event::from_parts("new_message".into(), json!({"chat_id": "c1", "message": {}}));
        let Event::NewMessage { message, .. } = event else {
            panic!("expected new_message");
        };
        assert_eq!(message.sender, "Unknown");
        assert_eq!(message.text, "");
    }

    #[test]
    fn loose_message_fields_are_accepted() {
        let event = Event::from_parts(
            "new_message".into(),
            json!({"chat_id": "c1", "message": {"sender": "bob", "message": "hi", "timestamp": 1714560000}}),
        );
        let Event::NewMessage { message, .. } = event else {
            panic!("numeric timestamp should still be a new_message");
        };
        assert_eq!(message.timestamp.as_deref(), Some("1714560000"));
        assert_eq!(message.text, "hi");

        let event = Event::from_parts(
            "new_message".into(),
            json!({"chat_id": "c1", "message": {"sender": null, "message": null, "timestamp": null, "is_action": null}}),
        );
        let Event::NewMessage { message, .. } = event else {
            panic!("null fields should still be a new_message");
        };
        assert_eq!(message.sender, "Unknown");
        assert_eq!(message.text, "");
        assert_eq!(message.timestamp, None);
        assert!(!message.is_action);
    }

    #[test]
    fn unknown_and_mismatched_kinds_pass_through() {
        let event = Event::from_parts("typing".into(), json!({"chat_id": "c1"}));
        assert_eq!(event.kind(), "typing");
        assert!(matches!(event, Event::Other { .. }));

        let event = Event::from_parts("user_online".into(), json!("not an object"));
        assert_eq!(
            event,
            Event::Other {
                kind: "user_online".into(),
                payload: json!("not an object"),
            }
        );
    }

    #[test]
    fn outbound_payloads_serialize() {
        let msg = SendMessage {
            chat_id: "c1",
            message: "say \"hi\"",
            is_action: false,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"chat_id": "c1", "message": "say \"hi\"", "is_action": false})
        );
    }
}
