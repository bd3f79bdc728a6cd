//! Connection manager: one driver task owns the [`Session`] and performs the
//! actions it asks for; [`ConnectionManager`] is the cloneable handle used by
//! everything else.
//!
//! ```text
//!   ConnectionManager ── Command ──►  driver task  ◄── Signal ── login / socket / timer tasks
//!          ▲                          (owns Session)
//!          │ watch<SessionStatus>          │
//!          └───────────────────────────────┤
//!                                          ▼
//!                           InboundQueue (notices, events, directory)
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::client::{self, OutboundWriter};
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::heartbeat::Heartbeat;
use crate::messages::{Inbound, SendMessage};
use crate::notice::Notice;
use crate::protocol;
use crate::queue::InboundSender;
use crate::session::{ConnectionState, ReconnectPolicy, Session, SessionAction};

/// Pause between the namespace connect and the authenticate frame.
pub const HANDSHAKE_DELAY: Duration = Duration::from_millis(100);

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Everything the driver needs to run a session.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub server_url: String,
    pub credentials: Option<Credentials>,
    pub policy: ReconnectPolicy,
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
    pub handshake_delay: Duration,
}

impl ConnectionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            server_url: config.server_url().to_string(),
            credentials: config.credentials().map(|(username, password)| Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            policy: ReconnectPolicy {
                max_attempts: config.reconnect_attempts(),
                delay: config.reconnect_delay(),
            },
            heartbeat_interval: config.heartbeat_interval(),
            request_timeout: config.request_timeout(),
            handshake_delay: HANDSHAKE_DELAY,
        }
    }
}

/// Snapshot of the session published after every transition.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub reconnect_count: u32,
    pub manual_disconnect: bool,
    pub heartbeat_running: bool,
    pub token: Option<String>,
}

impl std::fmt::Debug for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStatus")
            .field("state", &self.state)
            .field("reconnect_count", &self.reconnect_count)
            .field("manual_disconnect", &self.manual_disconnect)
            .field("heartbeat_running", &self.heartbeat_running)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect {
        silent: bool,
    },
    Logout,
    Send {
        chat_id: String,
        text: String,
        is_action: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

#[derive(Debug)]
enum Signal {
    LoginFinished {
        epoch: u64,
        result: Result<String>,
    },
    SocketOpened {
        epoch: u64,
        writer: OutboundWriter,
    },
    SocketClosed {
        epoch: u64,
    },
    ReconnectDue {
        epoch: u64,
    },
}

/// Handle to the running session. Clones share the same driver.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    pub(crate) api: ApiClient,
    pub(crate) inbound: InboundSender<Inbound>,
}

impl ConnectionManager {
    /// Spawn the driver on the current tokio runtime.
    pub fn start(options: ConnectionOptions, inbound: InboundSender<Inbound>) -> Result<Self> {
        let api = ApiClient::new(&options.server_url, options.request_timeout)?;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SessionStatus::default());

        let driver = Driver {
            session: Session::new(options.policy),
            socket_url: client::socket_url(&options.server_url),
            heartbeat: Heartbeat::new(options.heartbeat_interval),
            options,
            api: api.clone(),
            inbound: inbound.clone(),
            signals,
            status: status_tx,
            writer: None,
            socket_task: None,
        };
        tokio::spawn(driver.run(command_rx, signal_rx));

        Ok(Self {
            commands,
            status,
            api,
            inbound,
        })
    }

    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    pub fn disconnect(&self) {
        self.command(Command::Disconnect { silent: false });
    }

    /// Disconnect without a notification, for process shutdown.
    pub fn disconnect_silently(&self) {
        self.command(Command::Disconnect { silent: true });
    }

    /// Disconnect and drop the token.
    pub fn logout(&self) {
        self.command(Command::Logout);
    }

    /// Send a chat message over the open socket.
    pub async fn send_message(&self, chat_id: &str, text: &str, is_action: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            is_action,
            reply,
        });
        rx.await.unwrap_or(Err(ChatError::NotConnected))
    }

    /// Disconnect silently and wait for the driver to stop.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        self.command(Command::Shutdown { done });
        let _ = rx.await;
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn token(&self) -> Option<String> {
        self.status.borrow().token.clone()
    }

    /// Raw status channel. A `watch::Ref` borrowed from it blocks the
    /// driver's next publish, so never hold one across an `.await`;
    /// prefer [`ConnectionManager::wait_for`], which returns a snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until a status satisfies `pred` and return a copy of it. `None`
    /// on timeout or when the driver is gone.
    pub async fn wait_for(
        &self,
        pred: impl FnMut(&SessionStatus) -> bool,
        timeout: Duration,
    ) -> Option<SessionStatus> {
        let mut rx = self.status.clone();
        let snapshot = tokio::time::timeout(timeout, async {
            rx.wait_for(pred).await.map(|status| (*status).clone())
        })
        .await;
        snapshot.ok().and_then(|r| r.ok())
    }

    /// Wait until the session reaches `state`. False on timeout or when
    /// the driver is gone.
    pub async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
        self.wait_for(|s| s.state == state, timeout).await.is_some()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("connection driver is not running");
        }
    }
}

struct Driver {
    session: Session,
    options: ConnectionOptions,
    socket_url: String,
    api: ApiClient,
    inbound: InboundSender<Inbound>,
    signals: mpsc::UnboundedSender<Signal>,
    status: watch::Sender<SessionStatus>,
    heartbeat: Heartbeat,
    writer: Option<OutboundWriter>,
    socket_task: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { done }) => {
                        let actions = self.session.disconnect(true);
                        self.apply(actions).await;
                        self.publish();
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.on_command(command).await,
                    None => {
                        let actions = self.session.disconnect(true);
                        self.apply(actions).await;
                        break;
                    }
                },
                Some(signal) = signals.recv() => self.on_signal(signal).await,
            }
            self.publish();
        }
        tracing::debug!("connection driver stopped");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                let actions = self.session.connect(self.options.credentials.is_some());
                self.apply(actions).await;
            }
            Command::Disconnect { silent } => {
                let actions = self.session.disconnect(silent);
                self.apply(actions).await;
            }
            Command::Logout => {
                let actions = self.session.logout();
                self.apply(actions).await;
            }
            Command::Send {
                chat_id,
                text,
                is_action,
                reply,
            } => {
                let result = self.send_message(&chat_id, &text, is_action).await;
                let _ = reply.send(result);
            }
            Command::Shutdown { .. } => {}
        }
    }

    async fn on_signal(&mut self, signal: Signal) {
        let actions = match signal {
            Signal::LoginFinished { epoch, result } => match result {
                Ok(token) => self.session.login_succeeded(epoch, token),
                Err(e) => {
                    tracing::info!(error = %e, "login failed");
                    self.session.login_failed(epoch, &e)
                }
            },
            Signal::SocketOpened { epoch, writer } => {
                if self.session.is_current(epoch)
                    && self.session.state() == ConnectionState::SocketOpening
                {
                    tracing::info!("session open");
                    self.writer = Some(writer);
                    self.session.socket_opened(epoch)
                } else {
                    tokio::spawn(async move {
                        let _ = writer.close().await;
                    });
                    Vec::new()
                }
            }
            Signal::SocketClosed { epoch } => {
                if self.session.is_current(epoch) {
                    tracing::info!("socket closed");
                    self.writer = None;
                    self.socket_task = None;
                }
                self.session.socket_closed(epoch)
            }
            Signal::ReconnectDue { epoch } => self.session.reconnect_due(epoch),
        };
        self.apply(actions).await;
    }

    async fn apply(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Login { epoch } => self.spawn_login(epoch),
                SessionAction::OpenSocket { epoch, token } => self.spawn_socket(epoch, token),
                SessionAction::ScheduleReconnect { epoch, delay } => {
                    let signals = self.signals.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = signals.send(Signal::ReconnectDue { epoch });
                    });
                }
                SessionAction::StartHeartbeat => match &self.writer {
                    Some(writer) => self.heartbeat.start(writer.clone()),
                    None => tracing::warn!("heartbeat requested without a socket"),
                },
                SessionAction::StopHeartbeat => self.heartbeat.stop(),
                SessionAction::CloseSocket => {
                    self.close_socket().await;
                    self.session.close_finished();
                }
                SessionAction::LoadDirectory => {
                    if let Some(token) = self.session.token() {
                        spawn_directory_load(&self.api, token, &self.inbound);
                    }
                }
                SessionAction::Notify(notice) => {
                    self.inbound.push(Inbound::Notice(notice));
                }
            }
        }
    }

    fn spawn_login(&self, epoch: u64) {
        let Some(credentials) = self.options.credentials.clone() else {
            let _ = self.signals.send(Signal::LoginFinished {
                epoch,
                result: Err(ChatError::ConfigInvalid),
            });
            return;
        };
        let api = self.api.clone();
        let signals = self.signals.clone();
        tokio::spawn(async move {
            let result = api.login(&credentials.username, &credentials.password).await;
            let _ = signals.send(Signal::LoginFinished { epoch, result });
        });
    }

    fn spawn_socket(&mut self, epoch: u64, token: String) {
        let url = self.socket_url.clone();
        let connect_timeout = self.options.request_timeout;
        let handshake_delay = self.options.handshake_delay;
        let signals = self.signals.clone();
        let inbound = self.inbound.clone();
        self.socket_task = Some(tokio::spawn(async move {
            match client::open(&url, &token, connect_timeout, handshake_delay).await {
                Ok((writer, reader)) => {
                    let _ = signals.send(Signal::SocketOpened {
                        epoch,
                        writer: writer.clone(),
                    });
                    if let Err(e) = reader.pump(&writer, &inbound).await {
                        tracing::warn!(error = %e, "socket error");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "socket open failed"),
            }
            let _ = signals.send(Signal::SocketClosed { epoch });
        }));
    }

    async fn close_socket(&mut self) {
        self.heartbeat.stop();
        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await.is_err() {
                tracing::debug!("socket close timed out");
            }
        }
        if let Some(task) = self.socket_task.take() {
            task.abort();
        }
    }

    async fn send_message(&self, chat_id: &str, text: &str, is_action: bool) -> Result<()> {
        let writer = match (&self.writer, self.session.state()) {
            (Some(writer), ConnectionState::Open) => writer,
            _ => return Err(self.session.not_open_error()),
        };
        let frame = protocol::encode(
            "send_message",
            &SendMessage {
                chat_id,
                message: text,
                is_action,
            },
        )?;
        writer.send_frame(frame).await?;
        self.inbound.push(Inbound::Notice(Notice::MessageSent));
        Ok(())
    }

    fn publish(&self) {
        let status = SessionStatus {
            state: self.session.state(),
            reconnect_count: self.session.reconnect_count(),
            manual_disconnect: self.session.manual_disconnect(),
            heartbeat_running: self.heartbeat.is_running(),
            token: self.session.token().map(str::to_string),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Fetch friends and chats on their own tasks and queue the results.
pub(crate) fn spawn_directory_load(api: &ApiClient, token: &str, inbound: &InboundSender<Inbound>) {
    spawn_friends_load(api, token, inbound);
    spawn_chats_load(api, token, inbound);
}

pub(crate) fn spawn_friends_load(api: &ApiClient, token: &str, inbound: &InboundSender<Inbound>) {
    let api = api.clone();
    let token = token.to_string();
    let inbound = inbound.clone();
    tokio::spawn(async move {
        match api.friends(&token).await {
            Ok(friends) => {
                inbound.push(Inbound::Friends(friends));
            }
            Err(e) => tracing::warn!(error = %e, "loading friends failed"),
        }
    });
}

pub(crate) fn spawn_chats_load(api: &ApiClient, token: &str, inbound: &InboundSender<Inbound>) {
    let api = api.clone();
    let token = token.to_string();
    let inbound = inbound.clone();
    tokio::spawn(async move {
        match api.chats(&token).await {
            Ok(chats) => {
                tracing::debug!(count = chats.len(), "chats loaded");
                inbound.push(Inbound::Chats(chats));
            }
            Err(e) => tracing::warn!(error = %e, "loading chats failed"),
        }
    });
}
