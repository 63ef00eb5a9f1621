use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{codec::WireEnvelope, error::ChatError};

/// Minimum accepted token length, checked before any network activity.
pub const MIN_TOKEN_LEN: usize = 8;

/// Connection lifecycle state reported to the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been requested yet, or the client was torn down.
    Idle,
    /// A transport is being opened.
    Connecting,
    /// The transport is open and no close/error has been observed since.
    Connected,
    /// A recoverable close happened; a reconnect timer is pending.
    ReconnectWaiting,
    /// Terminal for the current campaign; only a manual connect leaves it.
    Failed,
}

impl ConnectionState {
    /// Whether a manual `connect` is accepted in this state.
    pub fn accepts_manual_connect(self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::ReconnectWaiting | ConnectionState::Failed
        )
    }

    /// Short label for status lines. `ReconnectWaiting` surfaces as connecting.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting | ConnectionState::ReconnectWaiting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "disconnected",
        }
    }
}

/// Display name plus opaque auth token. Immutable once validated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    display_name: String,
    token: String,
}

impl Credential {
    /// Validate and build a credential from user input.
    ///
    /// Both values are trimmed. The display name must be non-empty and the
    /// token must be at least [`MIN_TOKEN_LEN`] characters.
    pub fn new(display_name: &str, token: &str) -> Result<Self, ChatError> {
        let display_name = display_name.trim();
        let token = token.trim();

        if display_name.is_empty() {
            return Err(ChatError::validation(
                "empty_display_name",
                "a display name is required",
            ));
        }
        if token.is_empty() {
            return Err(ChatError::validation(
                "empty_token",
                "an authentication token is required",
            ));
        }
        if token.chars().count() < MIN_TOKEN_LEN {
            return Err(ChatError::validation(
                "token_too_short",
                format!("the token must contain at least {MIN_TOKEN_LEN} characters"),
            ));
        }

        Ok(Self {
            display_name: display_name.to_owned(),
            token: token.to_owned(),
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("display_name", &self.display_name)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Command channel input accepted by the runtime.
#[derive(Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Manual connect with freshly entered credentials. Starts a new campaign.
    Connect {
        display_name: String,
        token: String,
    },
    /// Send one chat line. Fire-and-forget.
    SendMessage { text: String },
    /// Tear down: cancel pending timers and close the live transport.
    Shutdown,
}

impl fmt::Debug for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatCommand::Connect { display_name, .. } => f
                .debug_struct("Connect")
                .field("display_name", display_name)
                .field("token", &"<redacted>")
                .finish(),
            ChatCommand::SendMessage { text } => {
                f.debug_struct("SendMessage").field("text", text).finish()
            }
            ChatCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Event channel output consumed by presentation sinks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ChatEvent {
    /// Lifecycle transition with a human-readable detail line.
    StatusChanged {
        state: ConnectionState,
        detail: String,
    },
    /// Decoded inbound envelope (chat line, join or leave notice).
    Incoming(WireEnvelope),
    /// User-visible error.
    Error {
        /// Stable machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
        /// `true` when the client landed in `Failed` and needs a manual connect.
        terminal: bool,
    },
}

impl ChatEvent {
    pub(crate) fn status(state: ConnectionState, detail: impl Into<String>) -> Self {
        ChatEvent::StatusChanged {
            state,
            detail: detail.into(),
        }
    }

    /// Build a user-visible error event from a [`ChatError`].
    pub fn from_error(error: &ChatError, terminal: bool) -> Self {
        ChatEvent::Error {
            code: error.code.clone(),
            message: error.message.clone(),
            terminal,
        }
    }
}
