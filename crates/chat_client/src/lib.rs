//! Chat client session library: login, the event socket and its reconnect
//! policy, heartbeat, inbound queue, local transcripts and the consumer that
//! turns events into notifications. Used by the `chat-client` binary.

mod actions;
pub mod api;
pub mod chats;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod messages;
pub mod notice;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod store;

pub use chats::{Chat, ChatCatalog, ChatKind, Friend, FriendStatus, FriendsList, NewChat};
pub use config::{default_config_path, Config, ConfigError};
pub use connection::{ConnectionManager, ConnectionOptions, Credentials, SessionStatus};
pub use dispatcher::{Collaborators, EventDispatcher, TICK_INTERVAL};
pub use error::{ChatError, Result};
pub use messages::{ChatMessage, Event, Inbound};
pub use notice::{Cue, NotificationPrefs, Notice};
pub use queue::{inbound_queue, InboundQueue, InboundSender};
pub use session::{ConnectionState, ReconnectPolicy};
pub use store::{MessageStore, StoredMessage};
