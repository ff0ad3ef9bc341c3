//! Session manager: keeps a participant connected across failures
//!
//! Owns the retry state machine around the chat session:
//! `Disconnected → Connecting → Active → (failure) → Disconnected → … →
//! Terminated`. The retry counter is an explicit field, a single budget
//! for the whole run that is never reset between failures. Teardown is
//! always attempted and never trusted: a close on an already-broken or
//! never-constructed session must not disturb the next attempt.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use amqchat_core::broker::BrokerConnector;
use amqchat_core::{BrokerError, ChatConfig, ChatError, ChatSession, Result, SessionState};

use crate::console::Console;

/// How one process run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Retry budget exhausted; the max-retries notice was printed
    RetriesExhausted,
    /// Local input ended; the session was closed gracefully
    InputClosed,
}

enum ActiveEvent {
    Input(Option<String>),
    ReceiveEnded,
}

enum ActiveOutcome {
    InputClosed,
    Failed(ChatError),
}

/// Drives connect, receive and send for one participant, retrying
/// transient failures up to a bounded budget
pub struct SessionManager {
    config: ChatConfig,
    connector: Arc<dyn BrokerConnector>,
    console: Console,
    input: mpsc::UnboundedReceiver<String>,
    state: SessionState,
    retries_left: u32,
}

impl SessionManager {
    pub fn new(
        config: ChatConfig,
        connector: Arc<dyn BrokerConnector>,
        console: Console,
        input: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        let retries_left = config.max_retries;
        Self {
            config,
            connector,
            console,
            input,
            state: SessionState::Disconnected,
            retries_left,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until the input ends or the retry budget is spent
    ///
    /// Only configuration errors escape as `Err`, and only before the
    /// first connection attempt; everything recoverable becomes a retry
    /// decision or the terminal max-retries notice.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.config.validate()?;

        loop {
            self.state = SessionState::Connecting;
            debug!(attempt_budget = self.retries_left, "connecting to broker");

            let mut session = match ChatSession::open(self.connector.as_ref(), &self.config).await
            {
                Ok(session) => session,
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "connection attempt failed");
                    if !self.schedule_retry().await {
                        return Ok(RunOutcome::RetriesExhausted);
                    }
                    continue;
                }
            };

            let (output_tx, mut output_rx) = mpsc::unbounded_channel();
            if let Err(e) = session.start_receiving(output_tx).await {
                warn!(error = %e, "failed to start receiving");
                session.close().await;
                if !self.schedule_retry().await {
                    return Ok(RunOutcome::RetriesExhausted);
                }
                continue;
            }

            self.state = SessionState::Active;
            info!(room = %self.config.room, participant = %self.config.participant,
                  "session active");

            // Forward non-self deliveries to the console printer.
            let console = self.console.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(line) = output_rx.recv().await {
                    console.received(line);
                }
            });

            let outcome = self.drive_active(&mut session).await;
            forwarder.abort();
            session.close().await;

            match outcome {
                ActiveOutcome::InputClosed => {
                    self.state = SessionState::Terminated;
                    return Ok(RunOutcome::InputClosed);
                }
                ActiveOutcome::Failed(e) => {
                    warn!(error = %e, "session failed");
                    if !self.schedule_retry().await {
                        return Ok(RunOutcome::RetriesExhausted);
                    }
                }
            }
        }
    }

    /// The ACTIVE state: publish input lines until something breaks
    async fn drive_active(&mut self, session: &mut ChatSession) -> ActiveOutcome {
        loop {
            let event = tokio::select! {
                line = self.input.recv() => ActiveEvent::Input(line),
                _ = session.receive_ended() => ActiveEvent::ReceiveEnded,
            };
            match event {
                ActiveEvent::Input(None) => return ActiveOutcome::InputClosed,
                ActiveEvent::Input(Some(line)) => {
                    if let Err(e) = session.send(&line).await {
                        return ActiveOutcome::Failed(e);
                    }
                }
                ActiveEvent::ReceiveEnded => {
                    return ActiveOutcome::Failed(ChatError::Receive(BrokerError::ChannelClosed))
                }
            }
        }
    }

    /// Spend one unit of the retry budget; false means the budget is gone
    async fn schedule_retry(&mut self) -> bool {
        if self.retries_left == 0 {
            self.state = SessionState::Terminated;
            self.console.notice("Max retries reached. Exiting...");
            return false;
        }
        self.retries_left -= 1;
        self.state = SessionState::Disconnected;
        self.console.notice("Trying to reconnect...");
        tokio::time::sleep(self.config.retry_delay).await;
        true
    }
}
