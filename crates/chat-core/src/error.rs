use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConnectionState;

/// Close code sent by a peer that is going away cleanly.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the stream ended without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Policy violation; the gateway uses it to reject an invalid token.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Broad error category used for user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChatErrorCategory {
    /// Bad local input; never reaches the network.
    Validation,
    /// Transport failure; recoverable through reconnection.
    Transport,
    /// The gateway rejected the credential. Terminal.
    Auth,
    /// The retry budget ran out. Terminal.
    RetriesExhausted,
    /// Command issued in a state that does not accept it.
    State,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ChatError {
    /// High-level error category.
    pub category: ChatErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ChatError {
    pub fn new(
        category: ChatErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ChatErrorCategory::Validation, code, message)
    }

    pub fn transport(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ChatErrorCategory::Transport, code, message)
    }

    pub fn auth_rejected() -> Self {
        Self::new(
            ChatErrorCategory::Auth,
            "auth_rejected",
            "authentication failed: invalid token",
        )
    }

    pub fn retries_exhausted(max_attempts: u32) -> Self {
        Self::new(
            ChatErrorCategory::RetriesExhausted,
            "retries_exhausted",
            format!("unable to reconnect after {max_attempts} attempts"),
        )
    }

    pub fn remote_closed(reason: &str) -> Self {
        let message = if reason.is_empty() {
            "the server closed the connection".to_owned()
        } else {
            format!("the server closed the connection: {reason}")
        };
        Self::new(ChatErrorCategory::Transport, "remote_closed", message)
    }

    pub fn not_connected() -> Self {
        Self::new(
            ChatErrorCategory::State,
            "not_connected",
            "not connected to the server",
        )
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ConnectionState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ChatErrorCategory::State,
            "invalid_state_transition",
            format!("cannot run '{action}' while connection is in state {current:?}"),
        )
    }

    /// Terminal errors always land the connection in `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.category,
            ChatErrorCategory::Auth | ChatErrorCategory::RetriesExhausted
        )
    }
}

/// Map a WebSocket close code to an error category.
///
/// Only the policy-violation code means the credential was rejected; every
/// other code is a transport failure that may be retried.
pub fn classify_close_code(code: u16) -> ChatErrorCategory {
    match code {
        CLOSE_POLICY_VIOLATION => ChatErrorCategory::Auth,
        _ => ChatErrorCategory::Transport,
    }
}

/// Map a handshake HTTP status to an error category.
pub fn classify_handshake_status(status: u16) -> ChatErrorCategory {
    match status {
        401 | 403 => ChatErrorCategory::Auth,
        _ => ChatErrorCategory::Transport,
    }
}
