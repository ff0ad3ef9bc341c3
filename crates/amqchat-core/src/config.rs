//! Configuration for chat sessions
//!
//! A single flat config struct covering the broker endpoint, the room,
//! the participant identity and the retry policy. Loadable from a TOML
//! file, with CLI arguments layered on top by the binary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Default retry budget for one process run
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default fixed backoff between reconnect attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Default broker handshake timeout
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one chat participant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Broker host (or full AMQP URI)
    pub host: String,
    /// Room name, used as the shared exchange name
    pub room: String,
    /// Display name attached to every outbound message
    pub participant: String,
    /// Retry budget for the whole run, not reset between failures
    pub max_retries: u32,
    /// Fixed delay between reconnect attempts (no jitter)
    pub retry_delay: Duration,
    /// Broker connection handshake timeout
    pub connection_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            room: String::new(),
            participant: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

impl ChatConfig {
    /// Create a configuration with the three required fields
    pub fn new<H, R, P>(host: H, room: R, participant: P) -> Self
    where
        H: Into<String>,
        R: Into<String>,
        P: Into<String>,
    {
        Self {
            host: host.into(),
            room: room.into(),
            participant: participant.into(),
            ..Self::default()
        }
    }

    /// Check that every required field is non-empty
    ///
    /// Called before the first connection attempt; a failure here is
    /// fatal and must never enter the retry loop.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ChatError::config_error("broker host must not be empty"));
        }
        if self.room.trim().is_empty() {
            return Err(ChatError::config_error("room name must not be empty"));
        }
        if self.participant.trim().is_empty() {
            return Err(ChatError::config_error(
                "participant name must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_retry_policy() {
        let config = ChatConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
    }

    #[test]
    fn validate_rejects_empty_fields() {
        assert!(ChatConfig::new("", "lobby", "alice").validate().is_err());
        assert!(ChatConfig::new("localhost", "", "alice")
            .validate()
            .is_err());
        assert!(ChatConfig::new("localhost", "lobby", "  ")
            .validate()
            .is_err());
        assert!(ChatConfig::new("localhost", "lobby", "alice")
            .validate()
            .is_ok());
    }

    #[test]
    fn loads_from_toml_with_defaults() {
        let config: ChatConfig = toml::from_str(
            r#"
            host = "rabbit.example.org"
            room = "lobby"
            participant = "alice"
            max_retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.host, "rabbit.example.org");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }
}
