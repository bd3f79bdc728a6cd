//! User-facing notifications and audio cues raised by the session layer.

use std::fmt;

/// Audio cue kinds; playback belongs to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    MessageReceived,
    MessageSent,
    GroupMessage,
    UserOnline,
    UserOffline,
    FriendRequest,
    Connected,
    Disconnected,
    Error,
}

/// Which cues play and which events are spoken. Everything is on except
/// reading back our own sent messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPrefs {
    /// Master switch for every cue.
    pub sound_enabled: bool,
    pub sound_message_received: bool,
    pub sound_message_sent: bool,
    pub sound_group_message: bool,
    pub sound_user_online: bool,
    pub sound_user_offline: bool,
    pub sound_friend_request: bool,
    pub sound_error: bool,
    pub sound_connected: bool,
    pub sound_disconnected: bool,
    pub speak_message_received: bool,
    pub speak_group_message: bool,
    pub speak_user_online: bool,
    pub speak_user_offline: bool,
    pub speak_friend_request: bool,
    /// Speak our own messages when they come back in the open chat.
    pub speak_message_sent: bool,
    /// Read the full text of messages arriving in the open chat.
    pub read_messages_aloud: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            sound_message_received: true,
            sound_message_sent: true,
            sound_group_message: true,
            sound_user_online: true,
            sound_user_offline: true,
            sound_friend_request: true,
            sound_error: true,
            sound_connected: true,
            sound_disconnected: true,
            speak_message_received: true,
            speak_group_message: true,
            speak_user_online: true,
            speak_user_offline: true,
            speak_friend_request: true,
            speak_message_sent: false,
            read_messages_aloud: true,
        }
    }
}

impl NotificationPrefs {
    pub fn plays(&self, cue: Cue) -> bool {
        self.sound_enabled
            && match cue {
                Cue::MessageReceived => self.sound_message_received,
                Cue::MessageSent => self.sound_message_sent,
                Cue::GroupMessage => self.sound_group_message,
                Cue::UserOnline => self.sound_user_online,
                Cue::UserOffline => self.sound_user_offline,
                Cue::FriendRequest => self.sound_friend_request,
                Cue::Connected => self.sound_connected,
                Cue::Disconnected => self.sound_disconnected,
                Cue::Error => self.sound_error,
            }
    }
}

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connected,
    Disconnected,
    /// Connect attempted without username/password.
    ConfigureCredentials,
    LoginFailed,
    Timeout,
    Unreachable,
    /// Automatic reconnection gave up.
    ReconnectExhausted,
    /// Cue only, no spoken text.
    MessageSent,
    Info(String),
    Failure(String),
}

impl Notice {
    /// Spoken text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Notice::Connected => Some("Connected"),
            Notice::Disconnected => Some("Disconnected"),
            Notice::ConfigureCredentials => Some("Configure credentials"),
            Notice::LoginFailed => Some("Login failed"),
            Notice::Timeout => Some("Timeout"),
            Notice::Unreachable => Some("Server unreachable"),
            Notice::ReconnectExhausted => Some("Connection lost. Manual reconnect needed."),
            Notice::MessageSent => None,
            Notice::Info(text) | Notice::Failure(text) => Some(text),
        }
    }

    pub fn cue(&self) -> Option<Cue> {
        match self {
            Notice::Connected => Some(Cue::Connected),
            Notice::Disconnected => Some(Cue::Disconnected),
            Notice::MessageSent => Some(Cue::MessageSent),
            Notice::Failure(_) => Some(Cue::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text().unwrap_or(""))
    }
}
