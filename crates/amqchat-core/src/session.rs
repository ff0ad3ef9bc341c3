//! Chat session: one participant's live connection to the room
//!
//! The session owns one broker connection and two independent channels,
//! one for publishing and one for subscribing, so a slow consumer never
//! blocks outbound sends and vice versa. A fresh sender token is
//! generated per session and attached to every outbound message; the
//! receive task drops deliveries carrying the local token.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::broker::{BrokerChannel, BrokerConnection, BrokerConnector, FANOUT_ROUTING_KEY};
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::message::ChatMessage;

/// One participant's live connection to a chat room
pub struct ChatSession {
    connection: Box<dyn BrokerConnection>,
    publish_channel: Box<dyn BrokerChannel>,
    subscribe_channel: Box<dyn BrokerChannel>,
    exchange: String,
    participant: String,
    sender_id: String,
    receive_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("exchange", &self.exchange)
            .field("participant", &self.participant)
            .field("sender_id", &self.sender_id)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Establish a session: connect, open both channels, declare the
    /// shared exchange
    ///
    /// Validates the configuration first so empty room/participant
    /// names fail fast without touching the network. The exchange
    /// declaration is idempotent; another participant having created it
    /// already is the normal case, not an error.
    pub async fn open(connector: &dyn BrokerConnector, config: &ChatConfig) -> Result<Self> {
        config.validate()?;

        let connection = connector
            .connect(&config.host)
            .await
            .map_err(ChatError::Connection)?;
        let publish_channel = connection
            .open_channel()
            .await
            .map_err(ChatError::Connection)?;
        let subscribe_channel = connection
            .open_channel()
            .await
            .map_err(ChatError::Connection)?;

        publish_channel
            .declare_exchange(&config.room)
            .await
            .map_err(ChatError::Connection)?;

        let sender_id = Uuid::new_v4().to_string();
        debug!(room = %config.room, participant = %config.participant, sender_id = %sender_id,
               "chat session established");

        Ok(Self {
            connection,
            publish_channel,
            subscribe_channel,
            exchange: config.room.clone(),
            participant: config.participant.clone(),
            sender_id,
            receive_task: None,
        })
    }

    /// The opaque token identifying this session's own messages
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Publish one line of text to the room
    pub async fn send(&self, text: &str) -> Result<()> {
        let message = ChatMessage::compose(&self.sender_id, &self.participant, text);
        self.publish_channel
            .publish(&self.exchange, FANOUT_ROUTING_KEY, message.into_envelope())
            .await
            .map_err(ChatError::Send)
    }

    /// Set up the session's mailbox and start the receive task
    ///
    /// Declares a fresh ephemeral queue, binds it with the catch-all
    /// key and spawns a background task that forwards every non-self
    /// delivery to `output`. Returns as soon as the consumer is
    /// registered; delivery happens asynchronously until the subscribe
    /// channel closes.
    pub async fn start_receiving(&mut self, output: mpsc::UnboundedSender<String>) -> Result<()> {
        let queue = self
            .subscribe_channel
            .declare_ephemeral_queue()
            .await
            .map_err(ChatError::Receive)?;
        self.subscribe_channel
            .bind_queue(&queue, &self.exchange, FANOUT_ROUTING_KEY)
            .await
            .map_err(ChatError::Receive)?;
        let mut deliveries = self
            .subscribe_channel
            .consume(&queue)
            .await
            .map_err(ChatError::Receive)?;

        let sender_id = self.sender_id.clone();
        self.receive_task = Some(tokio::spawn(async move {
            while let Some(envelope) = deliveries.recv().await {
                let message = ChatMessage::from_envelope(envelope);
                if message.is_from(&sender_id) {
                    trace!("suppressed self-echo");
                    continue;
                }
                if output.send(message.display_text).is_err() {
                    break;
                }
            }
            debug!("delivery stream ended");
        }));
        Ok(())
    }

    /// Resolves when the receive task ends, which only happens on
    /// channel loss or session teardown; pending forever before
    /// [`start_receiving`](Self::start_receiving)
    pub async fn receive_ended(&mut self) {
        match self.receive_task.as_mut() {
            Some(handle) => {
                let _ = handle.await;
                self.receive_task = None;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Tear the session down: both channels first, then the connection
    ///
    /// Best-effort by contract. Closing a session whose connection
    /// already dropped is normal during teardown-and-retry, so every
    /// failure here is logged and swallowed.
    pub async fn close(mut self) {
        if let Err(e) = self.publish_channel.close().await {
            debug!(error = %ChatError::ResourceCleanup(e), "publish channel close failed");
        }
        if let Err(e) = self.subscribe_channel.close().await {
            debug!(error = %ChatError::ResourceCleanup(e), "subscribe channel close failed");
        }
        if let Err(e) = self.connection.close().await {
            debug!(error = %ChatError::ResourceCleanup(e), "connection close failed");
        }
        // Closing the subscribe channel ends the delivery stream; the
        // abort is a backstop so the task never outlives the session.
        if let Some(handle) = self.receive_task.take() {
            handle.abort();
        }
    }
}
