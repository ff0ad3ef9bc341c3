//! Error handling for the amqchat CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("chat error: {0}")]
    Chat(#[from] amqchat_core::ChatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("input stream closed")]
    InputClosed,
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
