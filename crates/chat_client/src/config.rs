//! Client config load/save for `~/.chat-client/config.yaml`.
//! Sections: account.*, connection.*, storage.*, notifications.*.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::notice::NotificationPrefs;

/// Default backend when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Account section (server_url, username, password, email).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AccountSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Connection section (auto_connect, reconnect policy, timeouts).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ConnectionSection {
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_attempts: Option<u32>,
    /// Seconds between reconnection attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay: Option<u64>,
    /// Seconds before a backend request is abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Seconds between heartbeat events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<u64>,
}

/// Storage section (local transcripts).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StorageSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_messages_locally: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_folder: Option<String>,
}

/// Notifications section. Unset switches take the defaults of
/// [`NotificationPrefs`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NotificationsSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_message_received: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_message_sent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_group_message: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_user_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_user_offline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_friend_request: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_disconnected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_message_received: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_group_message: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_user_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_user_offline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_friend_request: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_message_sent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_messages_aloud: Option<bool>,
}

/// Full config file.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountSection,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub notifications: NotificationsSection,
}

impl Config {
    pub fn server_url(&self) -> &str {
        self.account
            .server_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SERVER_URL)
    }

    /// Username and password, only when both are non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.account.username.as_deref().filter(|s| !s.is_empty())?;
        let password = self.account.password.as_deref().filter(|s| !s.is_empty())?;
        Some((username, password))
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.connection.reconnect_attempts.unwrap_or(10)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.connection.reconnect_delay.unwrap_or(5))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.request_timeout.unwrap_or(10))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.connection.heartbeat_interval.unwrap_or(15))
    }

    pub fn save_messages_locally(&self) -> bool {
        self.storage.save_messages_locally.unwrap_or(true)
    }

    /// Root folder of the transcripts; `~/Chat Messages` unless configured.
    pub fn messages_folder(&self) -> PathBuf {
        match self.storage.messages_folder.as_deref() {
            Some(folder) if !folder.is_empty() => PathBuf::from(folder),
            _ => home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Chat Messages"),
        }
    }

    /// Cue and speech switches with defaults filled in.
    pub fn notification_prefs(&self) -> NotificationPrefs {
        let n = &self.notifications;
        let d = NotificationPrefs::default();
        NotificationPrefs {
            sound_enabled: n.sound_enabled.unwrap_or(d.sound_enabled),
            sound_message_received: n.sound_message_received.unwrap_or(d.sound_message_received),
            sound_message_sent: n.sound_message_sent.unwrap_or(d.sound_message_sent),
            sound_group_message: n.sound_group_message.unwrap_or(d.sound_group_message),
            sound_user_online: n.sound_user_online.unwrap_or(d.sound_user_online),
            sound_user_offline: n.sound_user_offline.unwrap_or(d.sound_user_offline),
            sound_friend_request: n.sound_friend_request.unwrap_or(d.sound_friend_request),
            sound_error: n.sound_error.unwrap_or(d.sound_error),
            sound_connected: n.sound_connected.unwrap_or(d.sound_connected),
            sound_disconnected: n.sound_disconnected.unwrap_or(d.sound_disconnected),
            speak_message_received: n.speak_message_received.unwrap_or(d.speak_message_received),
            speak_group_message: n.speak_group_message.unwrap_or(d.speak_group_message),
            speak_user_online: n.speak_user_online.unwrap_or(d.speak_user_online),
            speak_user_offline: n.speak_user_offline.unwrap_or(d.speak_user_offline),
            speak_friend_request: n.speak_friend_request.unwrap_or(d.speak_friend_request),
            speak_message_sent: n.speak_message_sent.unwrap_or(d.speak_message_sent),
            read_messages_aloud: n.read_messages_aloud.unwrap_or(d.read_messages_aloud),
        }
    }
}

/// Returns the default config file path: `~/.chat-client/config.yaml` (platform-specific).
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".chat-client").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
