//! Session state machine.
//!
//! [`Session`] decides, the connection driver acts. Each transition returns
//! the [`SessionAction`]s to perform; no I/O happens here. Every attempt
//! carries an epoch and results from older epochs are ignored, which is how
//! a login that completes after `disconnect()` gets dropped.
//!
//! Notification policy: the first transport failure since a clean state is
//! announced, later automatic retries are silent, and running out of
//! attempts is announced exactly once where the failure happens.

use std::time::Duration;

use crate::error::ChatError;
use crate::notice::Notice;

/// Life-cycle state of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Authenticating,
    SocketOpening,
    Open,
    Closing,
}

/// Automatic reconnection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Run the login request for this attempt.
    Login { epoch: u64 },
    /// Open the socket with the fresh token.
    OpenSocket { epoch: u64, token: String },
    /// Call back into [`Session::reconnect_due`] after `delay`.
    ScheduleReconnect { epoch: u64, delay: Duration },
    StartHeartbeat,
    StopHeartbeat,
    /// Close the socket, then call [`Session::close_finished`].
    CloseSocket,
    /// Fetch friends and chats once for this session.
    LoadDirectory,
    Notify(Notice),
}

/// The one logical session of a running client.
#[derive(Debug, Default)]
pub struct Session {
    token: Option<String>,
    state: ConnectionState,
    reconnect_count: u32,
    manual_disconnect: bool,
    epoch: u64,
    failure_announced: bool,
    exhausted: bool,
    policy: ReconnectPolicy,
}

impl Session {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    pub fn manual_disconnect(&self) -> bool {
        self.manual_disconnect
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// True once automatic reconnection gave up, until the next manual
    /// connect.
    pub fn reconnect_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Why an operation that needs an open socket cannot run right now.
    pub fn not_open_error(&self) -> ChatError {
        if self.exhausted {
            ChatError::ReconnectExhausted
        } else {
            ChatError::NotConnected
        }
    }

    /// User-requested connect.
    pub fn connect(&mut self, has_credentials: bool) -> Vec<SessionAction> {
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(state = ?self.state, "connect ignored, session already active");
            return Vec::new();
        }
        if !has_credentials {
            return vec![SessionAction::Notify(Notice::ConfigureCredentials)];
        }
        self.manual_disconnect = false;
        self.exhausted = false;
        self.begin_attempt()
    }

    fn begin_attempt(&mut self) -> Vec<SessionAction> {
        self.epoch += 1;
        self.state = ConnectionState::Authenticating;
        vec![SessionAction::Login { epoch: self.epoch }]
    }

    pub fn login_succeeded(&mut self, epoch: u64, token: String) -> Vec<SessionAction> {
        if !self.accepts(epoch, ConnectionState::Authenticating) {
            return Vec::new();
        }
        let announce = self.reconnect_count == 0 || self.failure_announced;
        self.reconnect_count = 0;
        self.failure_announced = false;
        self.token = Some(token.clone());
        self.state = ConnectionState::SocketOpening;

        let mut actions = Vec::new();
        if announce {
            actions.push(SessionAction::Notify(Notice::Connected));
        }
        actions.push(SessionAction::OpenSocket {
            epoch: self.epoch,
            token,
        });
        actions.push(SessionAction::LoadDirectory);
        actions
    }

    pub fn login_failed(&mut self, epoch: u64, error: &ChatError) -> Vec<SessionAction> {
        if !self.accepts(epoch, ConnectionState::Authenticating) {
            return Vec::new();
        }
        self.state = ConnectionState::Disconnected;
        if self.manual_disconnect {
            return Vec::new();
        }
        match error {
            ChatError::NetworkTimeout | ChatError::NetworkUnreachable(_) => {
                let mut actions = Vec::new();
                if self.reconnect_count == 0 {
                    let notice = if matches!(error, ChatError::NetworkTimeout) {
                        Notice::Timeout
                    } else {
                        Notice::Unreachable
                    };
                    self.failure_announced = true;
                    actions.push(SessionAction::Notify(notice));
                }
                actions.extend(self.recover());
                actions
            }
            ChatError::AuthRejected { .. } => vec![SessionAction::Notify(Notice::LoginFailed)],
            ChatError::ConfigInvalid => vec![SessionAction::Notify(Notice::ConfigureCredentials)],
            other => vec![SessionAction::Notify(Notice::Failure(format!("Error: {other}")))],
        }
    }

    /// Socket is up and authenticated.
    pub fn socket_opened(&mut self, epoch: u64) -> Vec<SessionAction> {
        if !self.accepts(epoch, ConnectionState::SocketOpening) {
            return Vec::new();
        }
        self.state = ConnectionState::Open;
        self.reconnect_count = 0;
        vec![SessionAction::StartHeartbeat]
    }

    /// Socket closed or failed to open, for any reason.
    pub fn socket_closed(&mut self, epoch: u64) -> Vec<SessionAction> {
        if !self.is_current(epoch)
            || !matches!(
                self.state,
                ConnectionState::SocketOpening | ConnectionState::Open
            )
        {
            return Vec::new();
        }
        self.state = ConnectionState::Disconnected;
        let mut actions = vec![SessionAction::StopHeartbeat];
        if self.manual_disconnect {
            actions.push(SessionAction::Notify(Notice::Disconnected));
            return actions;
        }
        actions.extend(self.recover());
        actions
    }

    /// A scheduled reconnection timer fired.
    pub fn reconnect_due(&mut self, epoch: u64) -> Vec<SessionAction> {
        if !self.accepts(epoch, ConnectionState::Disconnected) || self.manual_disconnect {
            return Vec::new();
        }
        self.begin_attempt()
    }

    /// Retry if attempts remain, otherwise announce that recovery gave up.
    fn recover(&mut self) -> Vec<SessionAction> {
        if self.reconnect_count >= self.policy.max_attempts {
            tracing::info!(attempts = self.reconnect_count, error = %ChatError::ReconnectExhausted, "giving up");
            self.exhausted = true;
            return vec![SessionAction::Notify(Notice::ReconnectExhausted)];
        }
        self.schedule_reconnect()
    }

    /// Silent: stops without a notification once attempts are used up.
    pub fn schedule_reconnect(&mut self) -> Vec<SessionAction> {
        if self.reconnect_count >= self.policy.max_attempts {
            return Vec::new();
        }
        self.reconnect_count += 1;
        tracing::debug!(attempt = self.reconnect_count, delay = ?self.policy.delay, "reconnect scheduled");
        vec![SessionAction::ScheduleReconnect {
            epoch: self.epoch,
            delay: self.policy.delay,
        }]
    }

    /// User-requested disconnect. `silent` suppresses the notification
    /// (process shutdown).
    pub fn disconnect(&mut self, silent: bool) -> Vec<SessionAction> {
        self.manual_disconnect = true;
        self.epoch += 1;
        let had_socket = matches!(
            self.state,
            ConnectionState::SocketOpening | ConnectionState::Open
        );
        let mut actions = vec![SessionAction::StopHeartbeat];
        if had_socket {
            self.state = ConnectionState::Closing;
            actions.push(SessionAction::CloseSocket);
        } else {
            self.state = ConnectionState::Disconnected;
        }
        if !silent {
            actions.push(SessionAction::Notify(Notice::Disconnected));
        }
        actions
    }

    /// Disconnect and forget the token.
    pub fn logout(&mut self) -> Vec<SessionAction> {
        let actions = self.disconnect(false);
        self.token = None;
        actions
    }

    /// The socket close requested by `CloseSocket` has completed.
    pub fn close_finished(&mut self) {
        if self.state == ConnectionState::Closing {
            self.state = ConnectionState::Disconnected;
        }
    }

    fn accepts(&self, epoch: u64, expected: ConnectionState) -> bool {
        if !self.is_current(epoch) || self.state != expected {
            tracing::debug!(epoch, current = self.epoch, state = ?self.state, "ignoring stale session signal");
            return false;
        }
        true
    }
}
