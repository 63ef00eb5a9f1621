use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    codec::{self, DecodeError, OutgoingMessage},
    error::{CLOSE_NORMAL, ChatError, ChatErrorCategory, classify_close_code},
    retry::RetryPolicy,
    types::{ChatEvent, ConnectionState, Credential},
};

/// Side effect the runtime must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a transport to the endpoint with this credential's token.
    /// Any previous transport must be fully closed first.
    Open { credential: Credential },
    /// Arm the reconnect timer.
    ScheduleReconnect { attempt: u32, delay: Duration },
    /// Disarm a pending reconnect timer.
    CancelReconnect,
    /// Write one encoded frame to the live transport.
    Write { payload: String },
    /// Best-effort close of the live transport.
    Close,
}

/// Events to emit plus actions to run, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub events: Vec<ChatEvent>,
    pub actions: Vec<ConnectionAction>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.actions.is_empty()
    }
}

/// How remote closes other than auth rejection are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePolicy {
    /// Retry after a normal (1000) close from the server. When `false`, a
    /// normal close ends the campaign in `Failed`.
    pub retry_normal_closure: bool,
}

impl Default for ClosePolicy {
    fn default() -> Self {
        Self {
            retry_normal_closure: true,
        }
    }
}

/// Connection lifecycle: connect, authenticate, fail and reconnect.
///
/// Pure and synchronous. Transport signals and timer expiries are fed in by
/// the runtime, which then executes the returned [`ConnectionAction`]s.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    attempt: u32,
    policy: RetryPolicy,
    close_policy: ClosePolicy,
    credential: Option<Credential>,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), ClosePolicy::default())
    }
}

impl ConnectionStateMachine {
    pub fn new(policy: RetryPolicy, close_policy: ClosePolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempt: 0,
            policy,
            close_policy,
            credential: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Manual connect. Starts a new campaign with a fresh credential.
    ///
    /// Rejected while a connection is already being opened or is live.
    pub fn connect(&mut self, credential: Credential) -> Result<Transition, ChatError> {
        if !self.state.accepts_manual_connect() {
            return Err(ChatError::invalid_state(self.state, "connect"));
        }

        let mut transition = Transition::default();
        if self.state == ConnectionState::ReconnectWaiting {
            transition.actions.push(ConnectionAction::CancelReconnect);
        }

        self.attempt = 0;
        self.credential = Some(credential.clone());
        self.enter_connecting(&mut transition, credential);
        Ok(transition)
    }

    pub fn on_opened(&mut self) -> Result<Transition, ChatError> {
        if self.state != ConnectionState::Connecting {
            return Err(ChatError::invalid_state(self.state, "on_opened"));
        }
        let name = self
            .credential
            .as_ref()
            .map(|credential| credential.display_name().to_owned())
            .unwrap_or_default();

        self.state = ConnectionState::Connected;
        self.attempt = 0;
        info!(display_name = %name, "connection established");

        Ok(Transition {
            events: vec![ChatEvent::status(
                ConnectionState::Connected,
                format!("connected as {name}"),
            )],
            actions: Vec::new(),
        })
    }

    /// Decode one inbound payload. Malformed payloads are logged and dropped.
    pub fn on_message(&self, raw: &str) -> Option<ChatEvent> {
        match codec::decode(raw) {
            Ok(envelope) => Some(ChatEvent::Incoming(envelope)),
            Err(err @ DecodeError::UnknownType(_)) => {
                debug!(code = err.code(), error = %err, "ignoring inbound envelope");
                None
            }
            Err(err) => {
                warn!(code = err.code(), error = %err, "discarding malformed inbound payload");
                None
            }
        }
    }

    /// Transport errors are diagnostic only; the following close decides.
    pub fn on_error(&self, message: &str) {
        warn!(state = ?self.state, error = message, "transport error");
    }

    pub fn on_closed(&mut self, code: u16, reason: &str) -> Transition {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = ?self.state, code, "ignoring close outside of a live connection");
            return Transition::default();
        }

        info!(code, reason, attempt = self.attempt, "transport closed");

        if classify_close_code(code) == ChatErrorCategory::Auth {
            return self.fail(ChatError::auth_rejected());
        }
        if code == CLOSE_NORMAL && !self.close_policy.retry_normal_closure {
            return self.fail(ChatError::remote_closed(reason));
        }

        let Some(attempt) = self.policy.next_attempt(self.attempt) else {
            return self.fail(ChatError::retries_exhausted(self.policy.max_attempts()));
        };

        let delay = self.policy.delay_for_attempt(attempt);
        self.attempt = attempt;
        self.state = ConnectionState::ReconnectWaiting;
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );

        Transition {
            events: vec![ChatEvent::status(
                ConnectionState::ReconnectWaiting,
                format!(
                    "reconnecting in {:.1}s (attempt {attempt}/{})",
                    delay.as_secs_f64(),
                    self.policy.max_attempts()
                ),
            )],
            actions: vec![ConnectionAction::ScheduleReconnect { attempt, delay }],
        }
    }

    /// Reconnect timer fired: reopen with the last credential.
    pub fn on_reconnect_timer(&mut self) -> Result<Transition, ChatError> {
        if self.state != ConnectionState::ReconnectWaiting {
            return Err(ChatError::invalid_state(self.state, "reconnect"));
        }
        let credential = self.credential.clone().ok_or_else(|| {
            ChatError::new(
                ChatErrorCategory::Internal,
                "missing_credential",
                "no credential is available for reconnect",
            )
        })?;

        let mut transition = Transition::default();
        self.enter_connecting(&mut transition, credential);
        Ok(transition)
    }

    /// Encode a chat line for the live transport.
    ///
    /// Blank text is a silent no-op. Sending while not connected is an error.
    pub fn send_message(&self, text: &str) -> Result<Transition, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Transition::default());
        }
        if self.state != ConnectionState::Connected {
            return Err(ChatError::not_connected());
        }
        let credential = self.credential.as_ref().ok_or_else(ChatError::not_connected)?;

        let payload = codec::encode(&OutgoingMessage::new(credential.display_name(), text))?;
        Ok(Transition {
            events: Vec::new(),
            actions: vec![ConnectionAction::Write { payload }],
        })
    }

    /// Teardown: cancel any pending timer, close the live transport, go idle.
    pub fn shutdown(&mut self) -> Transition {
        let mut transition = Transition::default();
        match self.state {
            ConnectionState::Idle => return transition,
            ConnectionState::ReconnectWaiting => {
                transition.actions.push(ConnectionAction::CancelReconnect)
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                transition.actions.push(ConnectionAction::Close)
            }
            ConnectionState::Failed => {}
        }

        self.state = ConnectionState::Idle;
        self.attempt = 0;
        self.credential = None;
        transition
            .events
            .push(ChatEvent::status(ConnectionState::Idle, "disconnected"));
        transition
    }

    fn enter_connecting(&mut self, transition: &mut Transition, credential: Credential) {
        self.state = ConnectionState::Connecting;
        let detail = if self.attempt == 0 {
            "connecting…".to_owned()
        } else {
            format!(
                "reconnecting (attempt {}/{})…",
                self.attempt,
                self.policy.max_attempts()
            )
        };
        transition
            .events
            .push(ChatEvent::status(ConnectionState::Connecting, detail));
        transition
            .actions
            .push(ConnectionAction::Open { credential });
    }

    fn fail(&mut self, error: ChatError) -> Transition {
        warn!(code = %error.code, "connection failed: {}", error.message);
        self.state = ConnectionState::Failed;
        Transition {
            events: vec![
                ChatEvent::status(ConnectionState::Failed, "disconnected"),
                ChatEvent::from_error(&error, true),
            ],
            actions: Vec::new(),
        }
    }
}
