//! Core messaging session logic for amqchat
//!
//! amqchat is a minimal group chat over a publish/subscribe broker:
//! every participant publishes to one shared topic exchange and
//! receives everyone else's messages through a session-scoped ephemeral
//! queue, suppressing its own echoes by sender token. This crate holds
//! the broker abstraction, the chat session and the pieces the session
//! manager in `amqchat-cli` builds on; the AMQP wire implementation
//! lives in `amqchat-amqp`.

pub mod broker;
pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod state;

pub use broker::{BrokerChannel, BrokerConnection, BrokerConnector, Envelope};
pub use config::ChatConfig;
pub use error::{BrokerError, BrokerResult, ChatError, Result};
pub use message::{ChatMessage, SENDER_ID_HEADER};
pub use session::ChatSession;
pub use state::SessionState;
