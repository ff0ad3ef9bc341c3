//! amqchat CLI: interactive group chat over an AMQP topic exchange

pub mod cli;
pub mod console;
pub mod error;
pub mod manager;
