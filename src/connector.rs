// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connector Abstraction
//!
//! A `Connector` hides one broker technology behind publish and consume.
//! Connectors are picked by URI scheme through the
//! [`ConnectorRegistry`](crate::registry::ConnectorRegistry).

use crate::{
    envelope::Envelope,
    errors::MessagingError,
    handler::{ErrorHandler, ReceiveHandler},
    queue::Queue,
};
use async_trait::async_trait;
use std::sync::Arc;

/// A broker technology behind publish and consume.
///
/// Implementations provision the queue topology before every operation, so
/// callers never declare queues themselves.
#[async_trait]
pub trait Connector: Send + Sync {
    /// URI schemes served by this connector.
    fn schema(&self) -> &'static [&'static str];

    /// Opens a connection to check the broker is reachable.
    ///
    /// With a pooled connection policy the connection is kept for later calls.
    async fn connect(&self) -> Result<(), MessagingError>;

    /// Provisions the envelope's queue and publishes its message.
    ///
    /// # Parameters
    /// * `envelope` - The target queue and the message to send
    ///
    /// # Returns
    /// Ok once the broker accepted the message, or the first error hit while
    /// validating, provisioning, publishing or releasing resources
    async fn publish(&self, envelope: &Envelope) -> Result<(), MessagingError>;

    /// Provisions `queue` and consumes it until a handler asks to exit, the
    /// broker stops delivering or shutdown is requested.
    ///
    /// # Parameters
    /// * `queue` - The queue to consume
    /// * `on_receive` - Handler run for every delivery
    /// * `on_error` - Handler run when `on_receive` fails or panics
    /// * `identification` - The consumer tag; the queue name when absent
    ///
    /// # Returns
    /// Ok when the consumer stopped normally, or the error that stopped it
    async fn consume(
        &self,
        queue: &Queue,
        on_receive: Arc<dyn ReceiveHandler>,
        on_error: Arc<dyn ErrorHandler>,
        identification: Option<&str>,
    ) -> Result<(), MessagingError>;
}
