//! Local per-chat transcripts: `{root}/{account}/{chat display name}.txt`.
//!
//! One message per line:
//!
//! ```text
//! bob; hello there ; 2024-05-01 12:00:00     regular message
//! bob waves ; 2024-05-01 12:00:05            action (/me) message
//! ```
//!
//! The format has no escaping. A text containing `" ; "` or a sender name
//! containing a space reads back differently than it was written, so
//! [`MessageStore::load_all`] is a best-effort reconstruction. The format is
//! kept as is so existing transcripts stay readable.
//!
//! Line breaks inside a sender or text are written as single spaces, so a
//! multi-line message stays one record and reads back with its lines
//! joined.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use crate::error::Result;

/// Local wall-clock format used for every transcript line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FIELD_DELIMITER: &str = " ; ";
const SENDER_DELIMITER: &str = "; ";

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub sender: String,
    pub text: String,
    pub timestamp_local: String,
    pub is_action: bool,
}

impl StoredMessage {
    /// Stamp a message with the current local time.
    pub fn now(sender: &str, text: &str, is_action: bool) -> Self {
        Self {
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp_local: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            is_action,
        }
    }

    /// Render as a transcript line, newline included.
    pub fn to_line(&self) -> String {
        let sender = single_line(&self.sender);
        let text = single_line(&self.text);
        if self.is_action {
            format!("{} {}{}{}\n", sender, text, FIELD_DELIMITER, self.timestamp_local)
        } else {
            format!(
                "{}{}{}{}{}\n",
                sender, SENDER_DELIMITER, text, FIELD_DELIMITER, self.timestamp_local
            )
        }
    }

    /// Parse one transcript line. Blank lines and lines without a
    /// timestamp field yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (content, timestamp) = line.rsplit_once(FIELD_DELIMITER)?;
        let (sender, text, is_action) = match content.split_once(SENDER_DELIMITER) {
            Some((sender, text)) => (sender, text, false),
            None => match content.split_once(' ') {
                Some((sender, text)) => (sender, text, true),
                None => (content, "", true),
            },
        };
        Some(Self {
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp_local: timestamp.to_string(),
            is_action,
        })
    }
}

/// Transcript folder of one account.
#[derive(Debug, Clone)]
pub struct MessageStore {
    root: PathBuf,
    account: String,
}

impl MessageStore {
    pub fn new(root: impl Into<PathBuf>, account: &str) -> Self {
        Self {
            root: root.into(),
            account: account.to_string(),
        }
    }

    pub fn account_dir(&self) -> PathBuf {
        self.root.join(file_component(&self.account))
    }

    /// Transcript file for a chat display name.
    pub fn transcript_path(&self, chat_name: &str) -> PathBuf {
        self.account_dir()
            .join(format!("{}.txt", file_component(chat_name)))
    }

    /// Append a message stamped with the current local time, creating the
    /// folders as needed. Returns the stored record.
    pub fn append(
        &self,
        chat_name: &str,
        sender: &str,
        text: &str,
        is_action: bool,
    ) -> Result<StoredMessage> {
        let message = StoredMessage::now(sender, text, is_action);
        self.append_record(chat_name, &message)?;
        Ok(message)
    }

    /// Append an already stamped record.
    pub fn append_record(&self, chat_name: &str, message: &StoredMessage) -> Result<()> {
        fs::create_dir_all(self.account_dir())?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.transcript_path(chat_name))?;
        file.write_all(message.to_line().as_bytes())?;
        Ok(())
    }

    /// Read back every parseable line of a transcript. A missing file is an
    /// empty transcript.
    pub fn load_all(&self, chat_name: &str) -> Result<Vec<StoredMessage>> {
        let path = self.transcript_path(chat_name);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut messages = Vec::new();
        for line in contents.lines() {
            match StoredMessage::parse_line(line) {
                Some(m) => messages.push(m),
                None if !line.trim().is_empty() => {
                    tracing::debug!(path = %path.display(), "skipping unparseable transcript line");
                }
                None => {}
            }
        }
        Ok(messages)
    }
}

/// `\r\n`, `\n` and `\r` each become one space.
fn single_line(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Path separators, `.`, `..` and the empty name would all resolve outside
/// (or onto) the parent folder.
fn file_component(name: &str) -> String {
    let name = name.replace(['/', '\\'], "_");
    if name.chars().all(|c| c == '.') {
        return "_".repeat(name.len().max(1));
    }
    name
}
