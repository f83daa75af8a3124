// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Provisioning
//!
//! Every publish and consume provisions the topology of its queue before
//! using it: the queue, the exchange named by the queue topic and the binding
//! between them. Declarations are declare-if-absent, so provisioning the same
//! descriptor again is harmless.
//!
//! Dead letter queues are provisioned first, depth first, each on its own
//! channel that is closed right away. The queue referencing a dead letter
//! queue is declared with the arguments that make the broker route rejected
//! and expired messages to the dead letter exchange.

use crate::{
    amqp::{
        errors::AmqpError,
        exchange::{ExchangeDefinition, ExchangeKind},
        queue::{
            QueueBinding, QueueDefinition, AMQP_HEADERS_DEAD_LETTER_EXCHANGE,
            AMQP_HEADERS_EXPIRES, AMQP_HEADERS_MESSAGE_TTL,
        },
        transport::{AmqpChannel, AmqpConnection},
    },
    errors::MessagingError,
    queue::{Queue, DEFAULT_EXCHANGE_TYPE, EXCHANGE_TYPE_PROPERTY},
};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error, warn};

/// Default message TTL on a queue with a dead letter queue: 72 hours in ms.
pub const DEFAULT_DEAD_LETTER_TTL_MS: i64 = 3600 * 72 * 1000;
/// Margin added to the message TTL to get the queue expiry.
pub const DEAD_LETTER_EXPIRES_MARGIN_MS: i64 = 1000;

/// A provisioned queue and the channel it was provisioned on.
///
/// The channel stays open; the caller publishes or consumes on it and
/// closes it when done.
pub struct ProvisionedTopology {
    /// Channel the declarations were made on.
    pub channel: Arc<dyn AmqpChannel>,
    /// Name of the declared queue.
    pub queue: String,
    /// Name of the exchange the queue is bound to.
    pub exchange: String,
    /// Routing key of the binding.
    pub routing_key: String,
}

/// Declarations for one queue, installed in order: queues, exchanges, bindings.
///
/// This struct collects the definitions with the builder pattern and
/// declares them on a single channel with [`AmqpTopology::install`].
pub struct AmqpTopology {
    channel: Arc<dyn AmqpChannel>,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) exchanges: Vec<ExchangeDefinition>,
    pub(crate) queues_binding: Vec<QueueBinding>,
}

impl AmqpTopology {
    /// Creates an empty topology.
    ///
    /// # Parameters
    /// * `channel` - The channel the declarations are made on
    ///
    /// # Returns
    /// A new AmqpTopology instance
    pub fn new(channel: Arc<dyn AmqpChannel>) -> AmqpTopology {
        AmqpTopology {
            channel,
            queues: vec![],
            exchanges: vec![],
            queues_binding: vec![],
        }
    }

    /// Adds a queue definition to the topology.
    ///
    /// # Parameters
    /// * `def` - A queue definition
    ///
    /// # Returns
    /// Self for method chaining
    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    /// Adds an exchange definition to the topology.
    ///
    /// # Parameters
    /// * `def` - An exchange definition
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    /// Adds a queue-to-exchange binding to the topology.
    ///
    /// # Parameters
    /// * `binding` - A queue binding
    ///
    /// # Returns
    /// Self for method chaining
    pub fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    /// Declares the queues, then the exchanges, then the bindings.
    ///
    /// Stops at the first failure; the channel is left open.
    ///
    /// # Returns
    /// Ok once every declaration succeeded, or the first AmqpError
    pub async fn install(&self) -> Result<(), AmqpError> {
        self.install_queue().await?;
        self.install_exchange().await?;
        self.binding_queues().await
    }

    async fn install_queue(&self) -> Result<(), AmqpError> {
        for def in &self.queues {
            debug!("creating queue: {}", def.name);

            if let Err(err) = self.channel.declare_queue(def).await {
                error!(error = err.to_string(), name = def.name.as_str(), "error to declare the queue");
                return Err(err);
            }

            debug!("queue: {} was created", def.name);
        }

        Ok(())
    }

    async fn install_exchange(&self) -> Result<(), AmqpError> {
        for exch in &self.exchanges {
            debug!("creating exchange: {} ({})", exch.name, exch.kind);

            if let Err(err) = self.channel.declare_exchange(exch).await {
                error!(
                    error = err.to_string(),
                    name = exch.name.as_str(),
                    "error to declare the exchange"
                );
                return Err(err);
            }

            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    async fn binding_queues(&self) -> Result<(), AmqpError> {
        for binding in &self.queues_binding {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );

            if let Err(err) = self.channel.bind_queue(binding).await {
                error!(error = err.to_string(), "error to bind queue to exchange");
                return Err(err);
            }
        }

        Ok(())
    }
}

/// Provisions a queue and its whole dead letter chain.
///
/// The descriptor is normalized first; the caller's value is left untouched.
/// Each dead letter queue is provisioned before the queue referencing it,
/// on its own channel that is closed right after.
///
/// # Parameters
/// * `connection` - An open connection to the broker
/// * `queue` - The queue descriptor to provision
///
/// # Returns
/// The provisioned topology with its open channel, an InvalidQueue or
/// DeadLetterCycle error for a bad descriptor, or the first broker error
pub async fn provision(
    connection: &dyn AmqpConnection,
    queue: &Queue,
) -> Result<ProvisionedTopology, MessagingError> {
    let normalized = queue.normalized()?;
    Ok(provision_normalized(connection, &normalized).await?)
}

/// Provisions an already normalized descriptor.
///
/// Recurses through the dead letter chain, hence the boxed future. The
/// channel of a failed install is closed before the error is returned.
pub(crate) fn provision_normalized<'a>(
    connection: &'a dyn AmqpConnection,
    queue: &'a Queue,
) -> BoxFuture<'a, Result<ProvisionedTopology, AmqpError>> {
    async move {
        let mut queue_args = BTreeMap::new();

        if let Some(dlq) = queue.dead_letter_queue() {
            debug!("provisioning dead letter queue: {} for: {}", dlq.name(), queue.name());
            let dead_letter = provision_normalized(connection, dlq).await?;
            dead_letter.channel.close().await?;

            queue_args = dead_letter_args(dlq);
        }

        let channel = connection.create_channel().await?;

        let name = queue.name();
        let topic = queue.resolved_topic();
        let routing_key = queue.routing_key();
        let kind: ExchangeKind = queue
            .exchange_type()
            .unwrap_or_else(|| DEFAULT_EXCHANGE_TYPE.to_owned())
            .parse()
            .unwrap_or_default();

        let topology = AmqpTopology::new(channel.clone())
            .queue(QueueDefinition::new(name).durable().args(queue_args))
            .exchange(ExchangeDefinition::new(topic).kind(kind).durable())
            .queue_binding(QueueBinding::new(name).exchange(topic).routing_key(&routing_key));

        if let Err(err) = topology.install().await {
            if let Err(close_err) = channel.close().await {
                warn!(error = close_err.to_string(), "failure to close channel");
            }
            return Err(err);
        }

        Ok(ProvisionedTopology {
            channel,
            queue: name.to_owned(),
            exchange: topic.to_owned(),
            routing_key,
        })
    }
    .boxed()
}

/// Builds the queue arguments routing rejected and expired messages to a
/// dead letter queue.
///
/// The dead letter queue's own properties are the starting point, without
/// `exchange_type`. The exchange, TTL and expiry are only filled in when
/// absent: the exchange is the DLQ topic, the TTL defaults to 72 hours and
/// the expiry to the TTL plus one second.
///
/// # Parameters
/// * `dlq` - The normalized dead letter queue
///
/// # Returns
/// The arguments to declare the referencing queue with
pub fn dead_letter_args(dlq: &Queue) -> BTreeMap<String, Value> {
    let mut args: BTreeMap<String, Value> = dlq
        .properties()
        .iter()
        .filter(|(key, _)| key.as_str() != EXCHANGE_TYPE_PROPERTY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    args.entry(AMQP_HEADERS_DEAD_LETTER_EXCHANGE.to_owned())
        .or_insert_with(|| Value::String(dlq.resolved_topic().to_owned()));

    let ttl = args
        .entry(AMQP_HEADERS_MESSAGE_TTL.to_owned())
        .or_insert_with(|| Value::from(DEFAULT_DEAD_LETTER_TTL_MS))
        .as_i64()
        .unwrap_or(DEFAULT_DEAD_LETTER_TTL_MS);

    args.entry(AMQP_HEADERS_EXPIRES.to_owned())
        .or_insert_with(|| Value::from(ttl.saturating_add(DEAD_LETTER_EXPIRES_MARGIN_MS)));

    args
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod tests;
