//! Error types for the amqchat core
//!
//! Two layers: `BrokerError` describes what went wrong at the broker
//! seam, `ChatError` classifies it by the session operation that failed
//! so the retry loop can tell recoverable failures from fatal ones.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Broker Errors
// ----------------------------------------------------------------------------

/// Errors raised by a broker transport implementation
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("broker handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("channel is closed")]
    ChannelClosed,

    #[error("exchange declaration failed for '{exchange}': {reason}")]
    ExchangeDeclare { exchange: String, reason: String },

    #[error("queue setup failed: {reason}")]
    QueueSetup { reason: String },

    #[error("publish failed: {reason}")]
    PublishFailed { reason: String },

    #[error("consume failed: {reason}")]
    ConsumeFailed { reason: String },

    #[error("close failed: {reason}")]
    CloseFailed { reason: String },
}

// ----------------------------------------------------------------------------
// Chat Errors
// ----------------------------------------------------------------------------

/// Core error taxonomy for chat sessions
///
/// `Configuration` is fatal and must be reported before any connection
/// attempt. Everything else is recoverable and feeds the retry loop.
/// `ResourceCleanup` is never propagated; it only exists so teardown
/// failures have a name in the logs.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("connection error: {0}")]
    Connection(#[source] BrokerError),

    #[error("send error: {0}")]
    Send(#[source] BrokerError),

    #[error("receive error: {0}")]
    Receive(#[source] BrokerError),

    #[error("cleanup error: {0}")]
    ResourceCleanup(#[source] BrokerError),
}

impl ChatError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ChatError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the retry loop may attempt a reconnect after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ChatError::Configuration { .. })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, ChatError>;
pub type BrokerResult<T> = core::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_recoverable() {
        assert!(!ChatError::config_error("empty room").is_recoverable());
    }

    #[test]
    fn broker_failures_are_recoverable() {
        let err = ChatError::Connection(BrokerError::Unreachable {
            address: "localhost".to_string(),
            reason: "refused".to_string(),
        });
        assert!(err.is_recoverable());
        assert!(ChatError::Send(BrokerError::ChannelClosed).is_recoverable());
        assert!(ChatError::Receive(BrokerError::ChannelClosed).is_recoverable());
    }
}
