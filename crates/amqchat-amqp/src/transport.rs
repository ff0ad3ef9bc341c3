//! AMQP implementations of the broker traits
//!
//! Maps the abstract broker seam onto lapin: one `Connection`, logical
//! `Channel`s multiplexed over it, a durable topic exchange per room,
//! and a server-named auto-deleting queue per session. The sender token
//! travels as a `SenderId` long-string header; anything else in that
//! header position decodes to "no token".

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::protocol::constants::REPLY_SUCCESS;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::mpsc;
use tracing::debug;

use amqchat_core::broker::{BrokerChannel, BrokerConnection, BrokerConnector, Envelope};
use amqchat_core::error::{BrokerError, BrokerResult};
use amqchat_core::SENDER_ID_HEADER;

// ----------------------------------------------------------------------------
// Connector
// ----------------------------------------------------------------------------

/// Connects to an AMQP broker with a bounded handshake
pub struct AmqpConnector {
    connection_timeout: Duration,
}

impl AmqpConnector {
    pub fn new(connection_timeout: Duration) -> Self {
        Self { connection_timeout }
    }

    /// Accepts either a bare host (`rabbit.example.org`) or a full URI
    fn amqp_uri(address: &str) -> String {
        if address.contains("://") {
            address.to_string()
        } else {
            format!("amqp://{}", address)
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self, address: &str) -> BrokerResult<Box<dyn BrokerConnection>> {
        let uri = Self::amqp_uri(address);
        let handshake = Connection::connect(&uri, ConnectionProperties::default());
        let connection = match tokio::time::timeout(self.connection_timeout, handshake).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                return Err(BrokerError::Unreachable {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BrokerError::HandshakeTimeout {
                    timeout_ms: self.connection_timeout.as_millis() as u64,
                })
            }
        };
        debug!(%uri, "AMQP connection established");
        Ok(Box::new(AmqpConnection { connection }))
    }
}

// ----------------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------------

struct AmqpConnection {
    connection: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> BrokerResult<Box<dyn BrokerChannel>> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Unreachable {
                address: "channel".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(AmqpChannel { channel }))
    }

    async fn close(&self) -> BrokerResult<()> {
        self.connection
            .close(REPLY_SUCCESS, "client shutdown")
            .await
            .map_err(|e| BrokerError::CloseFailed {
                reason: e.to_string(),
            })
    }
}

// ----------------------------------------------------------------------------
// Channel
// ----------------------------------------------------------------------------

struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, exchange: &str) -> BrokerResult<()> {
        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::ExchangeDeclare {
                exchange: exchange.to_string(),
                reason: e.to_string(),
            })
    }

    async fn declare_ephemeral_queue(&self) -> BrokerResult<String> {
        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::QueueSetup {
                reason: e.to_string(),
            })?;
        Ok(queue.name().as_str().to_string())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> BrokerResult<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::QueueSetup {
                reason: e.to_string(),
            })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: Envelope,
    ) -> BrokerResult<()> {
        // Publisher confirms are not enabled; the returned confirm
        // resolves immediately and is deliberately dropped.
        let _confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &envelope.body,
                properties_for(envelope.sender_id.as_deref()),
            )
            .await
            .map_err(|e| BrokerError::PublishFailed {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> BrokerResult<mpsc::UnboundedReceiver<Envelope>> {
        let mut consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::ConsumeFailed {
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let sender_id = sender_from_properties(&delivery.properties);
                        let envelope = Envelope {
                            body: delivery.data,
                            sender_id,
                        };
                        if tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "consumer stream error");
                        break;
                    }
                }
            }
            debug!("AMQP consumer stream ended");
        });
        Ok(rx)
    }

    async fn close(&self) -> BrokerResult<()> {
        self.channel
            .close(REPLY_SUCCESS, "client shutdown")
            .await
            .map_err(|e| BrokerError::CloseFailed {
                reason: e.to_string(),
            })
    }
}

// ----------------------------------------------------------------------------
// Header Mapping
// ----------------------------------------------------------------------------

fn properties_for(sender_id: Option<&str>) -> BasicProperties {
    match sender_id {
        Some(token) => {
            let mut headers = FieldTable::default();
            headers.insert(
                ShortString::from(SENDER_ID_HEADER),
                AMQPValue::LongString(token.into()),
            );
            BasicProperties::default().with_headers(headers)
        }
        None => BasicProperties::default(),
    }
}

/// Extract the sender token; missing or malformed headers yield `None`,
/// which downstream classifies as "not self"
fn sender_from_properties(properties: &BasicProperties) -> Option<String> {
    let headers = properties.headers().as_ref()?;
    headers.inner().iter().find_map(|(key, value)| {
        if key.as_str() != SENDER_ID_HEADER {
            return None;
        }
        match value {
            AMQPValue::LongString(token) => std::str::from_utf8(token.as_bytes())
                .ok()
                .map(str::to_string),
            _ => None,
        }
    })
}
