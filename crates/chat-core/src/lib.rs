//! Core contract for the chat client.
//!
//! This crate defines the connection lifecycle state machine, the reconnect
//! backoff policy, the wire codec, and the command/event channel types shared
//! by transport runtimes and presentation front ends. Nothing here performs
//! I/O.

/// Async command/event channel primitives.
pub mod channel;
/// Wire envelope encoding and decoding.
pub mod codec;
/// Stable error types and close-code classification.
pub mod error;
/// Backoff policy used by reconnect campaigns.
pub mod retry;
/// Connection lifecycle state machine.
pub mod state_machine;
/// Credential, lifecycle state, commands and events.
pub mod types;

pub use channel::{ChatChannelError, ChatChannels, EventStream};
pub use codec::{DecodeError, OutgoingMessage, WireEnvelope, decode, encode};
pub use error::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, ChatError, ChatErrorCategory,
    classify_close_code, classify_handshake_status,
};
pub use retry::RetryPolicy;
pub use state_machine::{ClosePolicy, ConnectionAction, ConnectionStateMachine, Transition};
pub use types::{ChatCommand, ChatEvent, ConnectionState, Credential, MIN_TOKEN_LEN};
