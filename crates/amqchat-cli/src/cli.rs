//! Command-line interface definitions and parsing

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Group chat over an AMQP topic exchange", long_about = None)]
pub struct Cli {
    /// Broker host or full AMQP URI (prompted for when absent)
    pub host: Option<String>,

    /// Room name shared by every participant (prompted for when absent)
    pub room: Option<String>,

    /// Display name attached to outbound messages (prompted for when absent)
    pub name: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Retry budget for the whole run
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Fixed delay between reconnect attempts, in seconds
    #[arg(long)]
    pub retry_delay_secs: Option<u64>,

    /// Use an in-process broker instead of AMQP (single-process local mode)
    #[arg(long)]
    pub memory: bool,
}
