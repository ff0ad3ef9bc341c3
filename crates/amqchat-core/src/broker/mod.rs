//! Broker abstraction for amqchat
//!
//! This module provides a unified interface over publish/subscribe
//! brokers, enabling clean separation between session logic and the
//! concrete wire protocol. The production implementation speaks AMQP
//! (`amqchat-amqp`); an in-memory broker lives in [`memory`] for tests
//! and local mode.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BrokerResult;

pub mod memory;

/// Routing key used for every publish and binding: the exchange is a
/// topic exchange used purely as fan-out, so one catch-all key is enough.
pub const FANOUT_ROUTING_KEY: &str = "";

// ----------------------------------------------------------------------------
// Wire Envelope
// ----------------------------------------------------------------------------

/// One message as it crosses the broker
///
/// The body is the UTF-8 display text; the sender token travels as
/// message metadata (a `SenderId` header on the AMQP wire). A missing
/// or malformed token decodes to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub body: Vec<u8>,
    pub sender_id: Option<String>,
}

// ----------------------------------------------------------------------------
// Broker Traits
// ----------------------------------------------------------------------------

/// Establishes connections to a broker endpoint
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connect to the broker at `address`
    ///
    /// Implementations bound the handshake with their configured
    /// timeout and report it as a broker error.
    async fn connect(&self, address: &str) -> BrokerResult<Box<dyn BrokerConnection>>;
}

/// One live connection, able to multiplex independent channels
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a new logical channel on this connection
    async fn open_channel(&self) -> BrokerResult<Box<dyn BrokerChannel>>;

    /// Close the connection and release broker-side resources
    async fn close(&self) -> BrokerResult<()>;
}

/// One logical channel: topology setup, publish and consume
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a durable topic exchange; idempotent, succeeds if the
    /// exchange already exists with matching durability
    async fn declare_exchange(&self, exchange: &str) -> BrokerResult<()>;

    /// Declare a fresh server-named, auto-deleting, non-durable queue
    /// and return its generated name
    async fn declare_ephemeral_queue(&self) -> BrokerResult<String>;

    /// Bind a queue to an exchange under the given routing key
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str)
        -> BrokerResult<()>;

    /// Publish an envelope to the exchange
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: Envelope,
    ) -> BrokerResult<()>;

    /// Start consuming from a queue
    ///
    /// Deliveries arrive on the returned receiver for the lifetime of
    /// the channel; closing the channel ends the stream, which unblocks
    /// any task waiting on it.
    async fn consume(&self, queue: &str) -> BrokerResult<mpsc::UnboundedReceiver<Envelope>>;

    /// Close the channel
    async fn close(&self) -> BrokerResult<()>;
}
