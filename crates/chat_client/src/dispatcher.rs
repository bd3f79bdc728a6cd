//! Single-threaded consumer of the inbound queue.
//!
//! [`EventDispatcher::tick`] drains everything queued since the last tick, in
//! arrival order, and turns it into catalog updates, transcript lines and
//! calls on the host's [`Collaborators`]. It never touches the network; the
//! reloads it asks for run on their own tasks.

use std::time::Duration;

use crate::chats::{ChatCatalog, FriendStatus, FriendsList};
use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::messages::{ChatMessage, Event, Inbound};
use crate::notice::{Cue, NotificationPrefs, Notice};
use crate::queue::InboundQueue;
use crate::store::{MessageStore, StoredMessage};

/// Interval of the consumer tick.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Host-side hooks. Only `notify` and `play_cue` are required.
pub trait Collaborators {
    fn notify(&mut self, text: &str);
    fn play_cue(&mut self, cue: Cue);
    fn on_chat_updated(&mut self, _chat_id: &str) {}
    fn on_friend_status_changed(&mut self, _username: &str, _status: FriendStatus) {}
    /// The friends list or the chat catalog was replaced.
    fn on_directory_changed(&mut self) {}
}

pub struct EventDispatcher<C> {
    queue: InboundQueue<Inbound>,
    account: String,
    collaborators: C,
    catalog: ChatCatalog,
    friends: FriendsList,
    active_chat: Option<String>,
    store: Option<MessageStore>,
    connection: Option<ConnectionManager>,
    prefs: NotificationPrefs,
}

impl<C: Collaborators> EventDispatcher<C> {
    /// `account` is the signed-in username, used to recognise echoes of our
    /// own messages and to resolve private chat names.
    pub fn new(queue: InboundQueue<Inbound>, account: &str, collaborators: C) -> Self {
        Self {
            queue,
            account: account.to_string(),
            collaborators,
            catalog: ChatCatalog::default(),
            friends: FriendsList::default(),
            active_chat: None,
            store: None,
            connection: None,
            prefs: NotificationPrefs::default(),
        }
    }

    /// Gate cues and spoken text on `prefs`.
    pub fn with_preferences(mut self, prefs: NotificationPrefs) -> Self {
        self.prefs = prefs;
        self
    }

    /// Persist incoming messages to `store`.
    pub fn with_store(mut self, store: MessageStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `connection` for the reloads some events call for.
    pub fn with_connection(mut self, connection: ConnectionManager) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Handle every queued item. Returns how many were handled.
    pub fn tick(&mut self) -> usize {
        let items = self.queue.drain();
        let count = items.len();
        for item in items {
            self.handle(item);
        }
        count
    }

    /// Tick every `period`. Never returns; drop the future to stop.
    pub async fn run(&mut self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    /// Mark `chat_id` as the chat on screen, clearing its unread counter.
    pub fn set_active_chat(&mut self, chat_id: Option<&str>) {
        self.active_chat = chat_id.map(str::to_string);
        if let Some(chat) = chat_id.and_then(|id| self.catalog.get_mut(id)) {
            chat.unread_count = 0;
        }
    }

    pub fn active_chat(&self) -> Option<&str> {
        self.active_chat.as_deref()
    }

    pub fn catalog(&self) -> &ChatCatalog {
        &self.catalog
    }

    pub fn friends(&self) -> &FriendsList {
        &self.friends
    }

    pub fn collaborators(&self) -> &C {
        &self.collaborators
    }

    pub fn collaborators_mut(&mut self) -> &mut C {
        &mut self.collaborators
    }

    /// Stored transcript of a chat. Empty when local saving is off.
    pub fn history(&self, chat_id: &str) -> Result<Vec<StoredMessage>> {
        match &self.store {
            Some(store) => store.load_all(&self.catalog.display_name(chat_id, &self.account)),
            None => Ok(Vec::new()),
        }
    }

    fn handle(&mut self, item: Inbound) {
        match item {
            Inbound::Event(event) => self.handle_event(event),
            Inbound::Notice(notice) => self.announce(&notice),
            Inbound::Friends(friends) => {
                self.friends = friends;
                self.collaborators.on_directory_changed();
            }
            Inbound::Chats(chats) => {
                self.catalog.replace_all(chats);
                if let Some(id) = self.active_chat.clone() {
                    self.set_active_chat(Some(id.as_str()));
                }
                self.collaborators.on_directory_changed();
            }
            Inbound::ChatCreated(chat) => {
                let chat_id = chat.chat_id.clone();
                self.catalog.insert(chat);
                self.collaborators.on_chat_updated(&chat_id);
            }
            Inbound::ChatRemoved(chat_id) => {
                self.catalog.remove(&chat_id);
                if self.active_chat.as_deref() == Some(chat_id.as_str()) {
                    self.active_chat = None;
                }
                self.collaborators.on_directory_changed();
            }
        }
    }

    fn cue(&mut self, cue: Cue) {
        if self.prefs.plays(cue) {
            self.collaborators.play_cue(cue);
        }
    }

    fn announce(&mut self, notice: &Notice) {
        if let Some(cue) = notice.cue() {
            self.cue(cue);
        }
        if let Some(text) = notice.text() {
            self.collaborators.notify(text);
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::NewMessage { chat_id, message } => self.on_new_message(&chat_id, message),
            Event::UserOnline { username } => {
                let speak = self.prefs.speak_user_online;
                self.on_presence(&username, FriendStatus::Online, Cue::UserOnline, speak)
            }
            Event::UserOffline { username } => {
                let speak = self.prefs.speak_user_offline;
                self.on_presence(&username, FriendStatus::Offline, Cue::UserOffline, speak)
            }
            Event::FriendRequest { from } => {
                self.cue(Cue::FriendRequest);
                if self.prefs.speak_friend_request {
                    self.collaborators
                        .notify(&format!("Friend request from {from}"));
                }
                self.reload_friends();
            }
            Event::FriendAccepted { username } => {
                self.cue(Cue::UserOnline);
                self.collaborators
                    .notify(&format!("{username} accepted friend request"));
                self.reload_friends();
            }
            Event::Heartbeat => {}
            Event::Other { kind, .. } => {
                tracing::debug!(%kind, "ignoring unhandled event");
            }
        }
    }

    fn on_new_message(&mut self, chat_id: &str, message: ChatMessage) {
        if !self.catalog.contains(chat_id) {
            self.reload_chats();
        }

        let stored = self.persist(chat_id, &message);

        if let Some(chat) = self.catalog.get_mut(chat_id) {
            chat.last_message_time = message
                .timestamp
                .clone()
                .or_else(|| stored.map(|s| s.timestamp_local));
        }

        let viewing = self.active_chat.as_deref() == Some(chat_id);

        if message.sender == self.account {
            if viewing && self.prefs.speak_message_sent {
                let line = if message.is_action {
                    format!("{} {}", message.sender, message.text)
                } else {
                    format!("{}; {}", message.sender, message.text)
                };
                self.collaborators.notify(&line);
            }
            self.collaborators.on_chat_updated(chat_id);
            return;
        }

        if !viewing {
            if let Some(chat) = self.catalog.get_mut(chat_id) {
                chat.unread_count += 1;
            }
        }

        let group_name = self.catalog.get(chat_id).filter(|c| c.is_group()).map(|c| {
            c.name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Group".to_string())
        });
        let sender = &message.sender;
        let text = match (&group_name, viewing) {
            (_, true) if !self.prefs.read_messages_aloud => None,
            (Some(group), true) => Some(format!("{sender} in {group}: {}", message.text)),
            (None, true) => Some(format!("{sender}: {}", message.text)),
            (Some(group), false) => Some(format!("{sender} in {group}")),
            (None, false) => Some(format!("Message from {sender}")),
        };
        let speak = if group_name.is_some() {
            self.cue(Cue::GroupMessage);
            self.prefs.speak_group_message
        } else {
            self.cue(Cue::MessageReceived);
            self.prefs.speak_message_received
        };
        if let Some(text) = text.filter(|_| speak) {
            self.collaborators.notify(&text);
        }
        self.collaborators.on_chat_updated(chat_id);
    }

    fn persist(&self, chat_id: &str, message: &ChatMessage) -> Option<StoredMessage> {
        let store = self.store.as_ref()?;
        let name = self.catalog.display_name(chat_id, &self.account);
        match store.append(&name, &message.sender, &message.text, message.is_action) {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!(error = %e, chat = %name, "failed to save message");
                None
            }
        }
    }

    fn on_presence(&mut self, username: &str, status: FriendStatus, cue: Cue, speak: bool) {
        self.cue(cue);
        if speak {
            let word = match status {
                FriendStatus::Online => "online",
                FriendStatus::Offline => "offline",
            };
            self.collaborators.notify(&format!("{username} is {word}"));
        }
        self.friends.set_status(username, status);
        self.collaborators.on_friend_status_changed(username, status);
    }

    fn reload_chats(&self) {
        if let Some(connection) = &self.connection {
            if !connection.refresh_chats() {
                tracing::debug!("chat reload skipped, not signed in");
            }
        }
    }

    fn reload_friends(&self) {
        if let Some(connection) = &self.connection {
            if !connection.refresh_friends() {
                tracing::debug!("friends reload skipped, not signed in");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chats::{Chat, ChatKind, Friend};
    use crate::queue::{inbound_queue, InboundSender};

    #[derive(Default)]
    struct Recorder {
        notes: Vec<String>,
        cues: Vec<Cue>,
        updated: Vec<String>,
        presence: Vec<(String, FriendStatus)>,
        directory_changes: usize,
    }

    impl Collaborators for Recorder {
        fn notify(&mut self, text: &str) {
            self.notes.push(text.to_string());
        }
        fn play_cue(&mut self, cue: Cue) {
            self.cues.push(cue);
        }
        fn on_chat_updated(&mut self, chat_id: &str) {
            self.updated.push(chat_id.to_string());
        }
        fn on_friend_status_changed(&mut self, username: &str, status: FriendStatus) {
            self.presence.push((username.to_string(), status));
        }
        fn on_directory_changed(&mut self) {
            self.directory_changes += 1;
        }
    }

    fn dispatcher() -> (InboundSender<Inbound>, EventDispatcher<Recorder>) {
        let (tx, rx) = inbound_queue();
        (tx, EventDispatcher::new(rx, "me", Recorder::default()))
    }

    fn chat(id: &str, kind: ChatKind, participants: &[&str], name: Option<&str>) -> Chat {
        Chat {
            chat_id: id.into(),
            kind,
            participants: participants.iter().map(|s| s.to_string()).collect(),
            admin: None,
            name: name.map(str::to_string),
            last_message_time: None,
            unread_count: 0,
        }
    }

    fn message(chat_id: &str, sender: &str, text: &str) -> Inbound {
        Inbound::Event(Event::NewMessage {
            chat_id: chat_id.into(),
            message: ChatMessage {
                sender: sender.into(),
                text: text.into(),
                timestamp: None,
                is_action: false,
            },
        })
    }

    #[test]
    fn message_outside_active_chat_counts_unread() {
        let (tx, mut d) = dispatcher();
        tx.push(Inbound::Chats(vec![chat("c1", ChatKind::Private, &["me", "bob"], None)]));
        tx.push(message("c1", "bob", "hi"));
        assert_eq!(d.tick(), 2);

        let r = d.collaborators();
        assert_eq!(r.notes, vec!["Message from bob"]);
        assert_eq!(r.cues, vec![Cue::MessageReceived]);
        assert_eq!(r.updated, vec!["c1"]);
        assert_eq!(d.catalog().get("c1").unwrap().unread_count, 1);
    }

    #[test]
    fn message_in_active_group_is_read_out() {
        let (tx, mut d) = dispatcher();
        tx.push(Inbound::Chats(vec![chat("g1", ChatKind::Group, &["me", "bob"], Some("Team"))]));
        d.tick();
        d.set_active_chat(Some("g1"));
        tx.push(message("g1", "bob", "standup?"));
        d.tick();

        let r = d.collaborators();
        assert_eq!(r.notes, vec!["bob in Team: standup?"]);
        assert_eq!(r.cues, vec![Cue::GroupMessage]);
        assert_eq!(d.catalog().get("g1").unwrap().unread_count, 0);
    }

    #[test]
    fn own_echo_is_silent() {
        let (tx, mut d) = dispatcher();
        tx.push(Inbound::Chats(vec![chat("c1", ChatKind::Private, &["me", "bob"], None)]));
        tx.push(message("c1", "me", "hello"));
        d.tick();

        let r = d.collaborators();
        assert!(r.notes.is_empty());
        assert!(r.cues.is_empty());
        assert_eq!(r.updated, vec!["c1"]);
        assert_eq!(d.catalog().get("c1").unwrap().unread_count, 0);
    }

    #[test]
    fn opening_a_chat_clears_unread() {
        let (tx, mut d) = dispatcher();
        tx.push(Inbound::Chats(vec![chat("c1", ChatKind::Private, &["me", "bob"], None)]));
        tx.push(message("c1", "bob", "1"));
        tx.push(message("c1", "bob", "2"));
        d.tick();
        assert_eq!(d.catalog().get("c1").unwrap().unread_count, 2);

        d.set_active_chat(Some("c1"));
        assert_eq!(d.catalog().get("c1").unwrap().unread_count, 0);
        assert_eq!(d.active_chat(), Some("c1"));
    }

    #[test]
    fn presence_updates_friend_list() {
        let (tx, mut d) = dispatcher();
        tx.push(Inbound::Friends(FriendsList {
            friends: vec![Friend {
                username: "amy".into(),
                status: FriendStatus::Offline,
            }],
            ..Default::default()
        }));
        tx.push(Inbound::Event(Event::UserOnline {
            username: "amy".into(),
        }));
        d.tick();

        let r = d.collaborators();
        assert_eq!(r.notes, vec!["amy is online"]);
        assert_eq!(r.cues, vec![Cue::UserOnline]);
        assert_eq!(r.presence, vec![("amy".to_string(), FriendStatus::Online)]);
        assert_eq!(r.directory_changes, 1);
        assert_eq!(d.friends().friends[0].status, FriendStatus::Online);
    }

    #[test]
    fn friend_events_are_announced() {
        let (tx, mut d) = dispatcher();
        tx.push(Inbound::Event(Event::FriendRequest { from: "zed".into() }));
        tx.push(Inbound::Event(Event::FriendAccepted {
            username: "amy".into(),
        }));
        d.tick();

        let r = d.collaborators();
        assert_eq!(
            r.notes,
            vec!["Friend request from zed", "amy accepted friend request"]
        );
        assert_eq!(r.cues, vec![Cue::FriendRequest, Cue::UserOnline]);
    }

    #[test]
    fn notices_play_cue_then_speak() {
        let (tx, mut d) = dispatcher();
        tx.push(Inbound::Notice(Notice::Connected));
        tx.push(Inbound::Notice(Notice::MessageSent));
        tx.push(Inbound::Notice(Notice::Unreachable));
        tx.push(Inbound::Event(Event::Heartbeat));
        assert_eq!(d.tick(), 4);

        let r = d.collaborators();
        assert_eq!(r.notes, vec!["Connected", "Server unreachable"]);
        assert_eq!(r.cues, vec![Cue::Connected, Cue::MessageSent]);
    }

    #[test]
    fn items_are_handled_in_arrival_order() {
        let (tx, mut d) = dispatcher();
        for name in ["a", "b", "c"] {
            tx.push(Inbound::Event(Event::FriendRequest { from: name.into() }));
        }
        d.tick();
        assert_eq!(
            d.collaborators().notes,
            vec![
                "Friend request from a",
                "Friend request from b",
                "Friend request from c"
            ]
        );
        assert_eq!(d.tick(), 0);
    }

    #[test]
    fn messages_are_saved_under_display_name() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = inbound_queue();
        let mut d = EventDispatcher::new(rx, "me", Recorder::default())
            .with_store(MessageStore::new(dir.path(), "me"));
        tx.push(Inbound::Chats(vec![chat("c1", ChatKind::Private, &["me", "bob"], None)]));
        tx.push(message("c1", "bob", "hi there"));
        tx.push(message("c2", "carol", "who dis"));
        d.tick();

        assert!(dir.path().join("me").join("bob.txt").exists());
        assert!(dir.path().join("me").join("c2.txt").exists());

        let history = d.history("c1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sender, "bob");
        assert_eq!(history[0].text, "hi there");
        assert!(d.catalog().get("c1").unwrap().last_message_time.is_some());
    }

    fn quiet_dispatcher(
        prefs: NotificationPrefs,
    ) -> (InboundSender<Inbound>, EventDispatcher<Recorder>) {
        let (tx, rx) = inbound_queue();
        let d = EventDispatcher::new(rx, "me", Recorder::default()).with_preferences(prefs);
        tx.push(Inbound::Chats(vec![
            chat("c1", ChatKind::Private, &["me", "bob"], None),
            chat("g1", ChatKind::Group, &["me", "bob"], Some("Team")),
        ]));
        (tx, d)
    }

    #[test]
    fn disabled_sounds_keep_speech() {
        let (tx, mut d) = quiet_dispatcher(NotificationPrefs {
            sound_enabled: false,
            ..Default::default()
        });
        tx.push(message("c1", "bob", "hi"));
        tx.push(Inbound::Notice(Notice::Connected));
        tx.push(Inbound::Event(Event::UserOffline {
            username: "amy".into(),
        }));
        d.tick();

        let r = d.collaborators();
        assert!(r.cues.is_empty());
        assert_eq!(r.notes, vec!["Message from bob", "Connected", "amy is offline"]);
    }

    #[test]
    fn single_cue_switch_only_mutes_that_cue() {
        let (tx, mut d) = quiet_dispatcher(NotificationPrefs {
            sound_group_message: false,
            ..Default::default()
        });
        tx.push(message("g1", "bob", "hi all"));
        tx.push(message("c1", "bob", "hi you"));
        d.tick();
        assert_eq!(d.collaborators().cues, vec![Cue::MessageReceived]);
    }

    #[test]
    fn disabled_speech_keeps_cues_and_unread() {
        let (tx, mut d) = quiet_dispatcher(NotificationPrefs {
            speak_message_received: false,
            speak_group_message: false,
            speak_user_online: false,
            speak_user_offline: false,
            speak_friend_request: false,
            ..Default::default()
        });
        tx.push(message("c1", "bob", "hi"));
        tx.push(message("g1", "bob", "hi all"));
        tx.push(Inbound::Event(Event::UserOnline {
            username: "amy".into(),
        }));
        tx.push(Inbound::Event(Event::FriendRequest { from: "zed".into() }));
        tx.push(Inbound::Event(Event::FriendAccepted {
            username: "amy".into(),
        }));
        d.tick();

        let r = d.collaborators();
        assert_eq!(r.notes, vec!["amy accepted friend request"]);
        assert_eq!(
            r.cues,
            vec![
                Cue::MessageReceived,
                Cue::GroupMessage,
                Cue::UserOnline,
                Cue::FriendRequest,
                Cue::UserOnline
            ]
        );
        assert_eq!(r.presence, vec![("amy".to_string(), FriendStatus::Online)]);
        assert_eq!(d.catalog().get("c1").unwrap().unread_count, 1);
    }

    #[test]
    fn open_chat_is_not_read_aloud_when_disabled() {
        let (tx, mut d) = quiet_dispatcher(NotificationPrefs {
            read_messages_aloud: false,
            ..Default::default()
        });
        d.tick();
        d.set_active_chat(Some("c1"));
        tx.push(message("c1", "bob", "secret"));
        tx.push(message("g1", "bob", "elsewhere"));
        d.tick();

        let r = d.collaborators();
        assert_eq!(r.notes, vec!["bob in Team"]);
        assert_eq!(r.cues, vec![Cue::MessageReceived, Cue::GroupMessage]);
    }

    #[test]
    fn own_messages_are_spoken_when_enabled() {
        let (tx, mut d) = quiet_dispatcher(NotificationPrefs {
            speak_message_sent: true,
            ..Default::default()
        });
        d.tick();
        d.set_active_chat(Some("c1"));
        tx.push(message("c1", "me", "hello"));
        tx.push(message("g1", "me", "not on screen"));
        d.tick();

        let r = d.collaborators();
        assert_eq!(r.notes, vec!["me; hello"]);
        assert!(r.cues.is_empty());
    }

    #[test]
    fn removed_chat_leaves_active_view() {
        let (tx, mut d) = dispatcher();
        tx.push(Inbound::Chats(vec![chat("c1", ChatKind::Private, &["me", "bob"], None)]));
        d.tick();
        d.set_active_chat(Some("c1"));
        tx.push(Inbound::ChatRemoved("c1".into()));
        d.tick();
        assert!(d.catalog().is_empty());
        assert_eq!(d.active_chat(), None);
    }
}
