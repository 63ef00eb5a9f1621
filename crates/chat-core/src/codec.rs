//! JSON wire envelopes exchanged with the chat gateway.
//!
//! Inbound envelopes are tagged by a `type` field. Content is passed through
//! untouched: the codec never escapes or sanitizes text, that is the job of
//! whatever renders it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ChatError;

const TYPE_FIELD: &str = "type";
const TAG_CHAT: &str = "message";
const TAG_JOINED: &str = "user_joined";
const TAG_LEFT: &str = "user_left";

/// Decoded inbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum WireEnvelope {
    /// A chat line broadcast by the gateway.
    #[serde(rename = "message")]
    Chat {
        username: String,
        text: String,
        /// Opaque timestamp, formatted for display by the sink.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
    /// Someone joined the chat.
    #[serde(rename = "user_joined")]
    Joined { username: String },
    /// Someone left the chat.
    #[serde(rename = "user_left")]
    Left { username: String },
}

/// Outgoing chat line. Built fresh for every send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename = "message")]
pub struct OutgoingMessage {
    pub username: String,
    pub text: String,
}

impl OutgoingMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
        }
    }
}

/// Why an inbound payload was discarded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("payload has no string `type` field")]
    MissingType,
    #[error("unknown envelope type '{0}'")]
    UnknownType(String),
    #[error("invalid '{kind}' envelope: {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Stable code used in diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::Syntax(_) => "decode_syntax",
            DecodeError::MissingType => "decode_missing_type",
            DecodeError::UnknownType(_) => "decode_unknown_type",
            DecodeError::InvalidFields { .. } => "decode_invalid_fields",
        }
    }
}

/// Parse one inbound text frame.
pub fn decode(raw: &str) -> Result<WireEnvelope, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Syntax)?;
    let kind = value
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_owned();

    if !matches!(kind.as_str(), TAG_CHAT | TAG_JOINED | TAG_LEFT) {
        return Err(DecodeError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| DecodeError::InvalidFields { kind, source })
}

/// Serialize an outgoing chat line as `{"type":"message","username":..,"text":..}`.
pub fn encode(message: &OutgoingMessage) -> Result<String, ChatError> {
    serde_json::to_string(message).map_err(|err| {
        ChatError::new(
            crate::error::ChatErrorCategory::Internal,
            "encode_failed",
            err.to_string(),
        )
    })
}
