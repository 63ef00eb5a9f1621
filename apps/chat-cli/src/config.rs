//! Environment-backed runtime configuration for `chat-cli`.

use std::env;

use chat_core::{ClosePolicy, RetryPolicy};
use chat_websocket::{DEFAULT_ENDPOINT, RuntimeConfig};
use thiserror::Error;
use url::Url;

const DEFAULT_RETRY_BASE_MS: u64 = 1_000;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Runtime configuration used by the terminal client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Gateway URL without the token.
    pub endpoint: Url,
    /// Optional display name; with a token it triggers an automatic connect.
    pub prefill_username: Option<String>,
    /// Optional auth token prefill.
    pub prefill_token: Option<String>,
    pub retry: RetryPolicy,
    pub close_policy: ClosePolicy,
}

impl ChatConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let endpoint = parse_endpoint(
            optional_trimmed_env("CHAT_ENDPOINT", &mut lookup)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned()),
        )?;
        let prefill_username = optional_trimmed_env("CHAT_USERNAME", &mut lookup);
        let prefill_token = optional_trimmed_env("CHAT_TOKEN", &mut lookup);

        let base_delay_ms =
            parse_with_default("CHAT_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS, &mut lookup)?;
        let max_delay_ms = parse_with_default(
            "CHAT_RETRY_MAX_DELAY_MS",
            DEFAULT_RETRY_MAX_DELAY_MS,
            &mut lookup,
        )?;
        let max_attempts = parse_with_default(
            "CHAT_RETRY_MAX_ATTEMPTS",
            DEFAULT_RETRY_MAX_ATTEMPTS,
            &mut lookup,
        )?;
        let retry_normal_closure =
            parse_bool_with_default("CHAT_RETRY_NORMAL_CLOSURE", true, &mut lookup)?;

        if base_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_RETRY_BASE_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if max_delay_ms < base_delay_ms {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_RETRY_MAX_DELAY_MS",
                value: max_delay_ms.to_string(),
                reason: format!("must not be below CHAT_RETRY_BASE_MS ({base_delay_ms})"),
            });
        }

        Ok(Self {
            endpoint,
            prefill_username,
            prefill_token,
            retry: RetryPolicy::new(base_delay_ms, max_delay_ms, max_attempts),
            close_policy: ClosePolicy {
                retry_normal_closure,
            },
        })
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            endpoint: self.endpoint.clone(),
            retry: self.retry,
            close_policy: self.close_policy,
        }
    }

    /// Display name and token when both are configured.
    pub fn prefilled_credential(&self) -> Option<(&str, &str)> {
        Some((
            self.prefill_username.as_deref()?,
            self.prefill_token.as_deref()?,
        ))
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_endpoint(value: String) -> Result<Url, ConfigError> {
    let url = Url::parse(&value).map_err(|err| ConfigError::InvalidValue {
        key: "CHAT_ENDPOINT",
        value: value.clone(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigError::InvalidValue {
            key: "CHAT_ENDPOINT",
            value,
            reason: "scheme must be ws or wss".to_owned(),
        });
    }
    Ok(url)
}

fn parse_with_default<T, F>(key: &'static str, default: T, lookup: &mut F) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_bool_with_default<F>(
    key: &'static str,
    default: bool,
    lookup: &mut F,
) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Result<ChatConfig, ConfigError> {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        ChatConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_gateway_client() {
        let cfg = config_from_pairs(&[]).expect("config should parse");
        assert_eq!(cfg.endpoint.as_str(), "ws://localhost:8080/ws");
        assert_eq!(cfg.retry, RetryPolicy::new(1_000, 10_000, 5));
        assert!(cfg.close_policy.retry_normal_closure);
        assert_eq!(cfg.prefilled_credential(), None);
    }

    #[test]
    fn parses_prefill_fields() {
        let cfg = config_from_pairs(&[
            ("CHAT_ENDPOINT", " wss://chat.example.org/ws "),
            ("CHAT_USERNAME", "alice"),
            ("CHAT_TOKEN", "12345678"),
        ])
        .expect("config should parse");

        assert_eq!(cfg.endpoint.as_str(), "wss://chat.example.org/ws");
        assert_eq!(cfg.prefilled_credential(), Some(("alice", "12345678")));
    }

    #[test]
    fn username_without_token_does_not_autoconnect() {
        let cfg = config_from_pairs(&[("CHAT_USERNAME", "alice")]).expect("config should parse");
        assert_eq!(cfg.prefilled_credential(), None);
    }

    #[test]
    fn parses_retry_tuning() {
        let cfg = config_from_pairs(&[
            ("CHAT_RETRY_BASE_MS", "250"),
            ("CHAT_RETRY_MAX_DELAY_MS", "4000"),
            ("CHAT_RETRY_MAX_ATTEMPTS", "8"),
            ("CHAT_RETRY_NORMAL_CLOSURE", "false"),
        ])
        .expect("config should parse");

        assert_eq!(cfg.retry, RetryPolicy::new(250, 4_000, 8));
        assert!(!cfg.close_policy.retry_normal_closure);

        let runtime = cfg.runtime_config();
        assert_eq!(runtime.retry, cfg.retry);
        assert_eq!(runtime.endpoint, cfg.endpoint);
    }

    #[test]
    fn rejects_non_websocket_endpoint() {
        let err = config_from_pairs(&[("CHAT_ENDPOINT", "http://localhost:8080/ws")])
            .expect_err("http endpoint should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CHAT_ENDPOINT",
                ..
            }
        ));
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let err = config_from_pairs(&[("CHAT_RETRY_MAX_ATTEMPTS", "many")])
            .expect_err("invalid attempts should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CHAT_RETRY_MAX_ATTEMPTS",
                ..
            }
        ));

        let err = config_from_pairs(&[("CHAT_RETRY_BASE_MS", "0")])
            .expect_err("zero base should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CHAT_RETRY_BASE_MS",
                ..
            }
        ));
    }

    #[test]
    fn rejects_cap_below_base() {
        let err = config_from_pairs(&[
            ("CHAT_RETRY_BASE_MS", "5000"),
            ("CHAT_RETRY_MAX_DELAY_MS", "1000"),
        ])
        .expect_err("cap below base should fail");
        assert_eq!(
            err.to_string(),
            "invalid CHAT_RETRY_MAX_DELAY_MS='1000': must not be below CHAT_RETRY_BASE_MS (5000)"
        );
    }

    #[test]
    fn rejects_unparseable_booleans() {
        let err = config_from_pairs(&[("CHAT_RETRY_NORMAL_CLOSURE", "maybe")])
            .expect_err("invalid bool should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CHAT_RETRY_NORMAL_CLOSURE",
                ..
            }
        ));
    }
}
