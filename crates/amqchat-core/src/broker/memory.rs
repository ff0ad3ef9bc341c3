//! In-memory broker for tests and local mode
//!
//! A process-local pub/sub broker implementing the broker traits.
//! Every publish fans out to every queue bound to the exchange,
//! including the publisher's own, so self-echo suppression is
//! observable without a real broker. Failure injection (refused
//! connections, severed links) makes the retry loop testable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{BrokerChannel, BrokerConnection, BrokerConnector, Envelope};
use crate::error::{BrokerError, BrokerResult};

// ----------------------------------------------------------------------------
// Broker State
// ----------------------------------------------------------------------------

#[derive(Default)]
struct ExchangeEntry {
    /// Names of queues bound to this exchange
    bindings: Vec<String>,
}

struct QueueEntry {
    sender: mpsc::UnboundedSender<Envelope>,
    /// Receiver parked here between queue declaration and consume
    pending: Option<mpsc::UnboundedReceiver<Envelope>>,
}

#[derive(Default)]
struct BrokerState {
    exchanges: Mutex<HashMap<String, ExchangeEntry>>,
    queues: Mutex<HashMap<String, QueueEntry>>,
    fail_connections: AtomicBool,
    severed: AtomicBool,
    connect_attempts: AtomicUsize,
    publish_count: AtomicUsize,
    consume_count: AtomicUsize,
}

impl BrokerState {
    fn check_link(&self) -> BrokerResult<()> {
        if self.severed.load(Ordering::SeqCst) {
            Err(BrokerError::ChannelClosed)
        } else {
            Ok(())
        }
    }
}

// ----------------------------------------------------------------------------
// Memory Broker
// ----------------------------------------------------------------------------

/// Handle to a process-local broker; cheap to clone
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent connection attempt fail
    pub fn fail_connections(&self, fail: bool) {
        self.state.fail_connections.store(fail, Ordering::SeqCst);
    }

    /// Break every live connection and channel out from under its owner
    pub fn sever(&self) {
        self.state.severed.store(true, Ordering::SeqCst);
    }

    /// Undo [`sever`](Self::sever) and accept connections again
    pub fn restore(&self) {
        self.state.severed.store(false, Ordering::SeqCst);
        self.state.fail_connections.store(false, Ordering::SeqCst);
    }

    /// Number of connection attempts made, successful or not
    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of messages published
    pub fn publish_count(&self) -> usize {
        self.state.publish_count.load(Ordering::SeqCst)
    }

    /// Number of consumers registered
    pub fn consume_count(&self) -> usize {
        self.state.consume_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self, address: &str) -> BrokerResult<Box<dyn BrokerConnection>> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connections.load(Ordering::SeqCst)
            || self.state.severed.load(Ordering::SeqCst)
        {
            return Err(BrokerError::Unreachable {
                address: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        debug!(address, "in-memory broker connection established");
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

// ----------------------------------------------------------------------------
// Connection and Channel
// ----------------------------------------------------------------------------

struct MemoryConnection {
    state: Arc<BrokerState>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn open_channel(&self) -> BrokerResult<Box<dyn BrokerChannel>> {
        self.state.check_link()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(Box::new(MemoryChannel {
            state: Arc::clone(&self.state),
            connection_closed: Arc::clone(&self.closed),
            closed: AtomicBool::new(false),
            owned_queues: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> BrokerResult<()> {
        if self.state.severed.load(Ordering::SeqCst) {
            return Err(BrokerError::CloseFailed {
                reason: "connection already dropped".to_string(),
            });
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryChannel {
    state: Arc<BrokerState>,
    connection_closed: Arc<AtomicBool>,
    closed: AtomicBool,
    /// Queues declared on this channel, removed from the broker on close
    owned_queues: Mutex<Vec<String>>,
}

impl MemoryChannel {
    fn ensure_open(&self) -> BrokerResult<()> {
        self.state.check_link()?;
        if self.closed.load(Ordering::SeqCst) || self.connection_closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_exchange(&self, exchange: &str) -> BrokerResult<()> {
        self.ensure_open()?;
        let mut exchanges = self.state.exchanges.lock().unwrap();
        // Declaration is idempotent: an existing exchange is left as is.
        exchanges.entry(exchange.to_string()).or_default();
        Ok(())
    }

    async fn declare_ephemeral_queue(&self) -> BrokerResult<String> {
        self.ensure_open()?;
        let name = format!("amq.gen-{}", Uuid::new_v4());
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state.queues.lock().unwrap().insert(
            name.clone(),
            QueueEntry {
                sender,
                pending: Some(receiver),
            },
        );
        self.owned_queues.lock().unwrap().push(name.clone());
        Ok(name)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        _routing_key: &str,
    ) -> BrokerResult<()> {
        self.ensure_open()?;
        let mut exchanges = self.state.exchanges.lock().unwrap();
        let entry = exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::QueueSetup {
                reason: format!("exchange '{}' does not exist", exchange),
            })?;
        if !entry.bindings.iter().any(|q| q == queue) {
            entry.bindings.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        _routing_key: &str,
        envelope: Envelope,
    ) -> BrokerResult<()> {
        self.ensure_open().map_err(|_| BrokerError::PublishFailed {
            reason: "channel closed".to_string(),
        })?;
        let bindings = {
            let exchanges = self.state.exchanges.lock().unwrap();
            match exchanges.get(exchange) {
                Some(entry) => entry.bindings.clone(),
                None => {
                    return Err(BrokerError::PublishFailed {
                        reason: format!("exchange '{}' does not exist", exchange),
                    })
                }
            }
        };
        // Fan out to every bound queue, the publisher's own included.
        let queues = self.state.queues.lock().unwrap();
        for name in &bindings {
            if let Some(entry) = queues.get(name) {
                let _ = entry.sender.send(envelope.clone());
            }
        }
        self.state.publish_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self, queue: &str) -> BrokerResult<mpsc::UnboundedReceiver<Envelope>> {
        self.ensure_open().map_err(|_| BrokerError::ConsumeFailed {
            reason: "channel closed".to_string(),
        })?;
        let mut queues = self.state.queues.lock().unwrap();
        let entry = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::ConsumeFailed {
                reason: format!("queue '{}' does not exist", queue),
            })?;
        let receiver = entry
            .pending
            .take()
            .ok_or_else(|| BrokerError::ConsumeFailed {
                reason: format!("queue '{}' already has a consumer", queue),
            })?;
        self.state.consume_count.fetch_add(1, Ordering::SeqCst);
        Ok(receiver)
    }

    async fn close(&self) -> BrokerResult<()> {
        if self.state.severed.load(Ordering::SeqCst) {
            return Err(BrokerError::CloseFailed {
                reason: "connection already dropped".to_string(),
            });
        }
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the queue senders ends any blocked consumer stream.
        let owned = std::mem::take(&mut *self.owned_queues.lock().unwrap());
        let mut queues = self.state.queues.lock().unwrap();
        let mut exchanges = self.state.exchanges.lock().unwrap();
        for name in owned {
            queues.remove(&name);
            for entry in exchanges.values_mut() {
                entry.bindings.retain(|q| q != &name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::FANOUT_ROUTING_KEY;

    fn envelope(body: &str, sender: Option<&str>) -> Envelope {
        Envelope {
            body: body.as_bytes().to_vec(),
            sender_id: sender.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn publish_echoes_to_every_bound_queue_including_publisher() {
        let broker = MemoryBroker::new();
        let connection = broker.connect("local").await.unwrap();
        let channel = connection.open_channel().await.unwrap();

        channel.declare_exchange("lobby").await.unwrap();
        let q1 = channel.declare_ephemeral_queue().await.unwrap();
        let q2 = channel.declare_ephemeral_queue().await.unwrap();
        channel
            .bind_queue(&q1, "lobby", FANOUT_ROUTING_KEY)
            .await
            .unwrap();
        channel
            .bind_queue(&q2, "lobby", FANOUT_ROUTING_KEY)
            .await
            .unwrap();

        let mut r1 = channel.consume(&q1).await.unwrap();
        let mut r2 = channel.consume(&q2).await.unwrap();

        channel
            .publish("lobby", FANOUT_ROUTING_KEY, envelope("alice: hi", Some("t1")))
            .await
            .unwrap();

        assert_eq!(r1.recv().await.unwrap().body, b"alice: hi".to_vec());
        assert_eq!(r2.recv().await.unwrap().body, b"alice: hi".to_vec());
    }

    #[tokio::test]
    async fn exchange_declaration_is_idempotent() {
        let broker = MemoryBroker::new();
        let connection = broker.connect("local").await.unwrap();
        let channel = connection.open_channel().await.unwrap();

        channel.declare_exchange("lobby").await.unwrap();
        channel.declare_exchange("lobby").await.unwrap();
    }

    #[tokio::test]
    async fn closing_the_channel_ends_the_consumer_stream() {
        let broker = MemoryBroker::new();
        let connection = broker.connect("local").await.unwrap();
        let channel = connection.open_channel().await.unwrap();

        channel.declare_exchange("lobby").await.unwrap();
        let queue = channel.declare_ephemeral_queue().await.unwrap();
        channel
            .bind_queue(&queue, "lobby", FANOUT_ROUTING_KEY)
            .await
            .unwrap();
        let mut deliveries = channel.consume(&queue).await.unwrap();

        channel.close().await.unwrap();
        assert!(deliveries.recv().await.is_none());
    }

    #[tokio::test]
    async fn refused_connections_are_counted() {
        let broker = MemoryBroker::new();
        broker.fail_connections(true);
        assert!(broker.connect("local").await.is_err());
        assert!(broker.connect("local").await.is_err());
        assert_eq!(broker.connect_attempts(), 2);
    }
}
