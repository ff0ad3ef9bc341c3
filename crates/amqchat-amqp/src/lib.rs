//! AMQP broker transport for amqchat
//!
//! Implements the `amqchat-core` broker traits over AMQP 0.9.1 using
//! lapin. Topology follows the room design: a durable topic exchange
//! named after the room, one server-named auto-deleting queue per
//! session, bound with the catch-all routing key.

mod transport;

pub use transport::AmqpConnector;
