//! Mezzo - Broker Gateway
//!
//! A thin facade over an AMQP 0-9-1 broker. One long-lived connection
//! is shared by every worker; each operation opens its own short-lived
//! channel, so a channel-level failure never poisons a neighbour.
//!
//! All exchanges the bus declares are durable fanout exchanges; all
//! queues it declares are durable. Transient queues (`<base>`) belong
//! to the producer/consumer applications and are only ever probed with
//! a passive declare.

mod error;
mod gateway;
mod management;
pub mod names;

pub use error::{BrokerError, Result};
pub use gateway::Broker;
pub use management::{ManagementClient, QueueInfo};
