//! Terminal presentation sink: renders runtime events as text lines.

use chat_core::{ChatEvent, ConnectionState, EventStream, WireEnvelope};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Print events until the runtime's event channel closes.
pub async fn run(mut events: EventStream) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(line) = render_event(&event, &Local) else {
                    continue;
                };
                if matches!(event, ChatEvent::Error { .. }) {
                    eprintln!("{line}");
                } else {
                    println!("{line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "terminal sink lagged behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Render one event, formatting timestamps in `tz`.
pub fn render_event<Tz>(event: &ChatEvent, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let line = match event {
        ChatEvent::StatusChanged { state, detail } => match state {
            ConnectionState::Idle => return None,
            _ => format!("-- [{}] {detail}", state.label()),
        },
        ChatEvent::Incoming(WireEnvelope::Chat {
            username,
            text,
            timestamp,
        }) => match format_timestamp(timestamp.as_ref(), tz) {
            Some(time) => format!("[{time}] {}: {}", sanitize(username), sanitize(text)),
            None => format!("{}: {}", sanitize(username), sanitize(text)),
        },
        ChatEvent::Incoming(WireEnvelope::Joined { username }) => {
            format!("* {} joined the chat", sanitize(username))
        }
        ChatEvent::Incoming(WireEnvelope::Left { username }) => {
            format!("* {} left the chat", sanitize(username))
        }
        ChatEvent::Error {
            message, terminal, ..
        } => {
            if *terminal {
                format!("!! {message} (use /connect to try again)")
            } else {
                format!("!! {message}")
            }
        }
    };
    Some(line)
}

/// `HH:MM` for RFC 3339 strings or epoch milliseconds, raw text otherwise.
pub fn format_timestamp<Tz>(value: Option<&Value>, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match value? {
        Value::String(raw) => Some(match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => parsed.with_timezone(tz).format("%H:%M").to_string(),
            Err(_) => sanitize(raw),
        }),
        Value::Number(number) => {
            let parsed = number.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis);
            Some(match parsed {
                Some(parsed) => parsed.with_timezone(tz).format("%H:%M").to_string(),
                None => number.to_string(),
            })
        }
        Value::Null => None,
        other => Some(sanitize(&other.to_string())),
    }
}

/// Replace control characters so remote text cannot drive the terminal.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_control() { '\u{FFFD}' } else { ch })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn chat(timestamp: Option<Value>) -> ChatEvent {
        ChatEvent::Incoming(WireEnvelope::Chat {
            username: "alice".into(),
            text: "hi".into(),
            timestamp,
        })
    }

    #[test]
    fn renders_chat_lines_with_time() {
        assert_eq!(
            render_event(&chat(Some(json!("2024-05-01T10:15:42Z"))), &Utc).as_deref(),
            Some("[10:15] alice: hi")
        );
        assert_eq!(
            render_event(&chat(Some(json!(1714558500000_i64))), &Utc).as_deref(),
            Some("[10:15] alice: hi")
        );
        assert_eq!(
            render_event(&chat(None), &Utc).as_deref(),
            Some("alice: hi")
        );
        assert_eq!(
            render_event(&chat(Some(json!("yesterday"))), &Utc).as_deref(),
            Some("[yesterday] alice: hi")
        );
    }

    #[test]
    fn renders_presence_and_status() {
        let joined = ChatEvent::Incoming(WireEnvelope::Joined {
            username: "bob".into(),
        });
        assert_eq!(
            render_event(&joined, &Utc).as_deref(),
            Some("* bob joined the chat")
        );

        let waiting = ChatEvent::StatusChanged {
            state: ConnectionState::ReconnectWaiting,
            detail: "reconnecting in 2.0s (attempt 1/5)".into(),
        };
        assert_eq!(
            render_event(&waiting, &Utc).as_deref(),
            Some("-- [connecting] reconnecting in 2.0s (attempt 1/5)")
        );

        let idle = ChatEvent::StatusChanged {
            state: ConnectionState::Idle,
            detail: "disconnected".into(),
        };
        assert_eq!(render_event(&idle, &Utc), None);
    }

    #[test]
    fn terminal_errors_prompt_for_manual_reconnect() {
        let event = ChatEvent::Error {
            code: "auth_rejected".into(),
            message: "authentication failed: invalid token".into(),
            terminal: true,
        };
        assert_eq!(
            render_event(&event, &Utc).as_deref(),
            Some("!! authentication failed: invalid token (use /connect to try again)")
        );
    }

    #[test]
    fn strips_terminal_control_sequences() {
        let event = ChatEvent::Incoming(WireEnvelope::Chat {
            username: "eve".into(),
            text: "\u{1b}[2Jgotcha".into(),
            timestamp: None,
        });
        assert_eq!(
            render_event(&event, &Utc).as_deref(),
            Some("eve: \u{FFFD}[2Jgotcha")
        );
    }
}
