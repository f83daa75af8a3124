// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Descriptors
//!
//! A `Queue` describes a logical destination: the queue name, the topic (the
//! exchange messages are routed through), a free-form property bag and an
//! optional dead letter queue. Dead letter queues are themselves `Queue`
//! values, so a chain such as `orders -> orders.retry -> orders.dead` is
//! described by nesting descriptors.
//!
//! Descriptors are plain values. Connectors never mutate the descriptor they
//! receive; they work on the copy returned by [`Queue::normalized`].

use crate::{
    amqp::queue::{AMQP_HEADERS_EXPIRES, AMQP_HEADERS_MESSAGE_TTL},
    errors::MessagingError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Property selecting the exchange kind (`direct`, `fanout`, `topic`, `headers`).
pub const EXCHANGE_TYPE_PROPERTY: &str = "exchange_type";
/// Reserved property overriding the routing key used to bind the queue.
pub const ROUTING_KEY_PROPERTY: &str = "_x_routing_key";
/// Exchange kind used when none is configured.
pub const DEFAULT_EXCHANGE_TYPE: &str = "direct";
/// Exchange kind forced on every dead letter queue.
pub const DEAD_LETTER_EXCHANGE_TYPE: &str = "fanout";
/// Properties holding durations in milliseconds; they must be integers.
const MILLISECOND_PROPERTIES: [&str; 2] = [AMQP_HEADERS_MESSAGE_TTL, AMQP_HEADERS_EXPIRES];

/// Declarative description of a destination queue.
///
/// Build one with [`Queue::new`] and the `with_*` methods, or deserialize it
/// from configuration. The dead letter queue is nested under
/// `dead_letter_queue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    routing_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dead_letter_queue: Option<Box<Queue>>,
}

impl Queue {
    /// Creates a new queue descriptor.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    ///
    /// # Returns
    /// A descriptor without topic, properties or dead letter queue
    pub fn new(name: impl Into<String>) -> Queue {
        Queue {
            name: name.into(),
            topic: None,
            routing_key: None,
            properties: BTreeMap::default(),
            dead_letter_queue: None,
        }
    }

    /// Sets the topic (exchange) messages for this queue are routed through.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Overrides the routing key used to bind the queue to its exchange.
    pub fn with_routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    /// Adds a single property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Replaces the whole property bag.
    pub fn with_properties(mut self, properties: BTreeMap<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    /// Attaches a dead letter queue.
    ///
    /// The resulting chain is validated: a chain that visits the same queue
    /// name twice is rejected with [`MessagingError::DeadLetterCycle`].
    ///
    /// # Parameters
    /// * `dlq` - The queue rejected and expired messages are routed to
    ///
    /// # Returns
    /// Self with the dead letter queue attached, or the validation error
    pub fn with_dead_letter_queue(mut self, dlq: Queue) -> Result<Self, MessagingError> {
        self.dead_letter_queue = Some(Box::new(dlq));
        self.validate()?;
        Ok(self)
    }

    /// Returns the name of the queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured topic, if any. See [`Queue::resolved_topic`].
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// The topic, falling back to the queue name.
    pub fn resolved_topic(&self) -> &str {
        self.topic.as_deref().unwrap_or(&self.name)
    }

    /// The routing key: the explicit override, then the reserved
    /// `_x_routing_key` property, then the queue name.
    pub fn routing_key(&self) -> String {
        self.routing_key
            .clone()
            .or_else(|| self.properties.get(ROUTING_KEY_PROPERTY).map(value_as_string))
            .unwrap_or_else(|| self.name.clone())
    }

    /// Returns the property bag.
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Returns a single property, if present.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// The configured exchange kind, if any.
    pub fn exchange_type(&self) -> Option<String> {
        self.properties.get(EXCHANGE_TYPE_PROPERTY).map(value_as_string)
    }

    /// Returns the attached dead letter queue, if any.
    pub fn dead_letter_queue(&self) -> Option<&Queue> {
        self.dead_letter_queue.as_deref()
    }

    /// Iterates over this queue followed by every queue of its dead letter chain.
    pub fn chain(&self) -> impl Iterator<Item = &Queue> {
        std::iter::successors(Some(self), |q| q.dead_letter_queue())
    }

    /// Checks the whole dead letter chain.
    ///
    /// Every name must be non-empty, explicit topics must be non-empty, no
    /// name may be visited twice and `x-message-ttl` / `x-expires`, when set,
    /// must be integers.
    ///
    /// # Returns
    /// `MessagingError::InvalidQueue` or `MessagingError::DeadLetterCycle`
    /// describing the first problem found
    pub fn validate(&self) -> Result<(), MessagingError> {
        let mut seen = HashSet::new();

        for queue in self.chain() {
            if queue.name.is_empty() {
                return Err(MessagingError::InvalidQueue(
                    "queue name must not be empty".to_owned(),
                ));
            }

            if queue.topic.as_deref() == Some("") {
                return Err(MessagingError::InvalidQueue(format!(
                    "topic of queue `{}` must not be empty",
                    queue.name
                )));
            }

            for key in MILLISECOND_PROPERTIES {
                if queue.properties.get(key).is_some_and(|value| value.as_i64().is_none()) {
                    return Err(MessagingError::InvalidQueue(format!(
                        "property `{}` of queue `{}` must be an integer",
                        key, queue.name
                    )));
                }
            }

            if !seen.insert(queue.name.as_str()) {
                return Err(MessagingError::DeadLetterCycle(queue.name.clone()));
            }
        }

        Ok(())
    }

    /// Returns the normalized copy used by connectors.
    ///
    /// In the copy the topic is always set, the routing key is resolved and
    /// removed from the properties, the exchange kind defaults to `direct` and
    /// every dead letter queue of the chain uses a `fanout` exchange.
    pub fn normalized(&self) -> Result<Queue, MessagingError> {
        self.validate()?;
        Ok(self.normalize_with(None))
    }

    fn normalize_with(&self, forced_exchange_type: Option<&str>) -> Queue {
        let routing_key = self.routing_key();

        let mut properties = self.properties.clone();
        properties.remove(ROUTING_KEY_PROPERTY);

        let exchange_type = match forced_exchange_type {
            Some(kind) => kind.to_owned(),
            None => self
                .exchange_type()
                .unwrap_or_else(|| DEFAULT_EXCHANGE_TYPE.to_owned()),
        };
        properties.insert(EXCHANGE_TYPE_PROPERTY.to_owned(), Value::String(exchange_type));

        Queue {
            name: self.name.clone(),
            topic: Some(self.resolved_topic().to_owned()),
            routing_key: Some(routing_key),
            properties,
            dead_letter_queue: self
                .dead_letter_queue
                .as_ref()
                .map(|dlq| Box::new(dlq.normalize_with(Some(DEAD_LETTER_EXCHANGE_TYPE)))),
        }
    }
}

/// Strings are taken as-is; other values use their JSON rendering.
fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
