// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! Broker level queue declarations and bindings, built by the topology
//! provisioning out of [`crate::Queue`] descriptors. Queues are always
//! declared non-exclusive, non-auto-delete and non-passive; only durability
//! and the arguments vary.

use serde_json::Value;
use std::collections::BTreeMap;

/// Header field naming the exchange rejected or expired messages go to
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Header field holding the message TTL in milliseconds
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Header field holding the idle time in milliseconds after which the queue is deleted
pub const AMQP_HEADERS_EXPIRES: &str = "x-expires";

/// Definition of a RabbitMQ queue with its durability and arguments.
///
/// This struct implements the builder pattern used by the topology
/// provisioning to describe each queue it declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) args: BTreeMap<String, Value>,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is transient and carries no arguments.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    ///
    /// # Returns
    /// A new queue definition with default settings
    pub fn new(name: impl Into<String>) -> QueueDefinition {
        QueueDefinition {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Replaces the declaration arguments of the queue.
    ///
    /// # Parameters
    /// * `args` - Broker arguments such as `x-dead-letter-exchange` or `x-message-ttl`
    ///
    /// # Returns
    /// Self for method chaining
    pub fn args(mut self, args: BTreeMap<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// Returns the name of the queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declaration arguments of the queue.
    pub fn arguments(&self) -> &BTreeMap<String, Value> {
        &self.args
    }

    /// Returns true when the queue survives broker restarts.
    pub fn is_durable(&self) -> bool {
        self.durable
    }
}

/// Binding of a queue to an exchange.
///
/// Messages published on the exchange with a matching routing key are
/// routed to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a new binding for the given queue.
    ///
    /// # Parameters
    /// * `queue` - The name of the queue to bind
    ///
    /// # Returns
    /// A binding whose exchange and routing key are still empty
    pub fn new(queue: impl Into<String>) -> QueueBinding {
        QueueBinding {
            queue_name: queue.into(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    /// Sets the exchange the queue is bound to.
    ///
    /// # Parameters
    /// * `exchange` - The name of the exchange
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange_name = exchange.into();
        self
    }

    /// Sets the routing key of the binding.
    ///
    /// # Parameters
    /// * `key` - The routing key matched against published messages
    ///
    /// # Returns
    /// Self for method chaining
    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = key.into();
        self
    }
}
