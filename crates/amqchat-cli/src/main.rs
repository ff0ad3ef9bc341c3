//! amqchat - group chat over an AMQP topic exchange

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use amqchat_amqp::AmqpConnector;
use amqchat_core::broker::memory::MemoryBroker;
use amqchat_core::broker::BrokerConnector;
use amqchat_core::ChatConfig;

use amqchat_cli::{
    cli::Cli,
    console::{Console, LineReader},
    error::{CliError, Result},
    manager::SessionManager,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    let (console, printer) = Console::stdout();
    console.notice("Welcome to the amqchat application");

    // Resolve configuration, prompting for anything still missing.
    // Configuration failures are fatal and never enter the retry loop.
    let mut reader = LineReader::stdin();
    let config = match resolve_config(&cli, &console, &mut reader).await {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            console.notice(format!("Error: {}", e));
            drop(console);
            let _ = printer.await;
            return ExitCode::FAILURE;
        }
    };

    let connector: Arc<dyn BrokerConnector> = if cli.memory {
        Arc::new(MemoryBroker::new())
    } else {
        Arc::new(AmqpConnector::new(config.connection_timeout))
    };

    // Foreground input pump: prompt, read, hand off to the manager.
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let pump_console = console.clone();
    let pump = tokio::spawn(async move {
        loop {
            match reader.read_value(&pump_console, "Enter message: ").await {
                Ok(Some(line)) => {
                    if input_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    let mut manager = SessionManager::new(config, connector, console.clone(), input_rx);
    let result = manager.run().await;
    pump.abort();

    let code = match result {
        Ok(outcome) => {
            info!(?outcome, "chat ended");
            ExitCode::SUCCESS
        }
        Err(e) => {
            console.notice(format!("Error: {}", e));
            ExitCode::FAILURE
        }
    };

    // Let the printer drain before the process exits.
    drop(manager);
    drop(console);
    let _ = printer.await;
    code
}

/// Setup logging based on verbosity level
///
/// Diagnostics go to stderr; stdout belongs to the chat protocol.
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the effective configuration: CLI args > config file > defaults,
/// with interactive prompts for required fields still missing
async fn resolve_config(
    cli: &Cli,
    console: &Console,
    reader: &mut LineReader,
) -> Result<ChatConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)?
        }
        None => ChatConfig::default(),
    };

    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(secs) = cli.retry_delay_secs {
        config.retry_delay = Duration::from_secs(secs);
    }

    if let Some(host) = &cli.host {
        config.host = host.clone();
    } else if cli.config.is_none() {
        config.host = prompt_value(console, reader, "Enter the broker host: ").await?;
    }

    if let Some(room) = &cli.room {
        config.room = room.clone();
    }
    if config.room.trim().is_empty() {
        config.room = prompt_value(console, reader, "Enter the room name: ").await?;
    }

    if let Some(name) = &cli.name {
        config.participant = name.clone();
    }
    if config.participant.trim().is_empty() {
        config.participant = prompt_value(console, reader, "Enter your name: ").await?;
    }

    config.validate()?;
    Ok(config)
}

async fn prompt_value(
    console: &Console,
    reader: &mut LineReader,
    prompt: &str,
) -> Result<String> {
    reader
        .read_value(console, prompt)
        .await?
        .ok_or(CliError::InputClosed)
}
