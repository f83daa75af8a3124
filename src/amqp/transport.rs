// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Transport Seams
//!
//! The connector talks to the broker through these traits only. The lapin
//! backed implementation lives in [`crate::amqp::channel`]; tests plug in an
//! in-memory broker.

use crate::{
    amqp::{
        errors::AmqpError,
        exchange::ExchangeDefinition,
        queue::{QueueBinding, QueueDefinition},
    },
    config::ConnectorConfig,
    errors::MessagingError,
    message::Message,
    uri::ConnectionUri,
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// Stream of deliveries for one registered consumer.
pub type DeliveryStream = BoxStream<'static, Result<InboundDelivery, AmqpError>>;

/// Opens transport connections.
#[async_trait]
pub trait AmqpDialer: Send + Sync {
    /// Opens a connection to the broker named by `uri`.
    ///
    /// # Parameters
    /// * `uri` - The broker URI
    /// * `cfg` - Connector settings such as the connection name
    ///
    /// # Returns
    /// The open connection, or a configuration or connection error
    async fn dial(
        &self,
        uri: &ConnectionUri,
        cfg: &ConnectorConfig,
    ) -> Result<Arc<dyn AmqpConnection>, MessagingError>;
}

/// An open transport connection.
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    /// Opens a new channel on the connection.
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError>;

    /// Returns true while the connection is usable.
    fn is_connected(&self) -> bool;

    /// Closes the connection and every channel opened on it.
    async fn close(&self) -> Result<(), AmqpError>;
}

/// A channel on an open connection.
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    /// Declares a queue, succeeding when an equivalent one already exists.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    /// Declares an exchange, succeeding when an equivalent one already exists.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Limits the unacknowledged deliveries pushed to consumers of this channel.
    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError>;

    /// Publishes a message; its headers become the basic properties.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), AmqpError>;

    /// Registers a manually acknowledged consumer.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError>;

    /// Cancels the consumer registered with `consumer_tag`.
    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError>;

    /// Closes the channel.
    async fn close(&self) -> Result<(), AmqpError>;
}

/// Settles one delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    /// Acknowledges the delivery.
    async fn ack(&self) -> Result<(), AmqpError>;

    /// Rejects the delivery, putting it back on the queue when `requeue` is set.
    async fn nack(&self, requeue: bool) -> Result<(), AmqpError>;
}

/// A message pushed by the broker, with the metadata of its delivery.
pub struct InboundDelivery {
    /// Broker assigned tag, unique per channel.
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    /// Only reported by the broker for polled messages.
    pub message_count: Option<u32>,
    /// Body plus the headers rebuilt from the basic properties.
    pub message: Message,
    pub acker: Box<dyn DeliveryAcker>,
}

impl std::fmt::Debug for InboundDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundDelivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("message_count", &self.message_count)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
