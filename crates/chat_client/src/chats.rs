//! Chat and friend records as served by the backend, plus the local catalog.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Private,
    Group,
}

/// One chat as listed by `GET /api/chats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: String,
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Chat {
    /// Name shown to `me`: the group name, or the other participant of a
    /// private chat. Falls back to the chat id.
    pub fn display_name(&self, me: &str) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if self.kind == ChatKind::Private {
            return self
                .participants
                .iter()
                .find(|p| p.as_str() != me)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
        }
        self.chat_id.clone()
    }

    pub fn is_group(&self) -> bool {
        self.kind == ChatKind::Group
    }
}

/// Request body for `POST /api/chats/create`.
#[derive(Debug, Clone, Serialize)]
pub struct NewChat {
    pub participants: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl NewChat {
    pub fn private(with: &str) -> Self {
        Self {
            participants: vec![with.to_string()],
            kind: ChatKind::Private,
            name: None,
        }
    }

    pub fn group(name: &str, participants: Vec<String>) -> Self {
        Self {
            participants,
            kind: ChatKind::Group,
            name: Some(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Online,
    #[default]
    #[serde(other)]
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friend {
    pub username: String,
    #[serde(default)]
    pub status: FriendStatus,
}

/// Response of `GET /api/friends`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FriendsList {
    #[serde(default)]
    pub friends: Vec<Friend>,
    #[serde(default)]
    pub pending_incoming: Vec<String>,
    #[serde(default)]
    pub pending_outgoing: Vec<String>,
}

impl FriendsList {
    /// Update a friend's presence. Returns false when the name is unknown.
    pub fn set_status(&mut self, username: &str, status: FriendStatus) -> bool {
        match self.friends.iter_mut().find(|f| f.username == username) {
            Some(friend) => {
                friend.status = status;
                true
            }
            None => false,
        }
    }
}

/// Chats known to this client, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ChatCatalog {
    chats: HashMap<String, Chat>,
}

impl ChatCatalog {
    /// Replace the whole catalog, keeping local unread counters the server
    /// does not know about.
    pub fn replace_all(&mut self, chats: Vec<Chat>) {
        let previous = std::mem::take(&mut self.chats);
        for mut chat in chats {
            if let Some(old) = previous.get(&chat.chat_id) {
                chat.unread_count = chat.unread_count.max(old.unread_count);
            }
            self.chats.insert(chat.chat_id.clone(), chat);
        }
    }

    pub fn insert(&mut self, chat: Chat) {
        self.chats.insert(chat.chat_id.clone(), chat);
    }

    pub fn remove(&mut self, chat_id: &str) -> Option<Chat> {
        self.chats.remove(chat_id)
    }

    pub fn get(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.get(chat_id)
    }

    pub fn get_mut(&mut self, chat_id: &str) -> Option<&mut Chat> {
        self.chats.get_mut(chat_id)
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.chats.contains_key(chat_id)
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Display name for a chat id; unknown chats fall back to the raw id.
    pub fn display_name(&self, chat_id: &str, me: &str) -> String {
        match self.chats.get(chat_id) {
            Some(chat) => chat.display_name(me),
            None => chat_id.to_string(),
        }
    }

    /// Chats ordered by most recent activity first.
    pub fn by_activity(&self) -> Vec<&Chat> {
        let mut chats: Vec<&Chat> = self.chats.values().collect();
        chats.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.chat_id.cmp(&b.chat_id))
        });
        chats
    }
}
