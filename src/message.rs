// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messages and Delivery Outcomes
//!
//! A `Message` is an opaque body plus a mutable header map. Headers carry both
//! user metadata and, once a message has been delivered, the metadata the
//! broker attached to the delivery (see the `HEADER_*` constants).
//!
//! An `Outcome` is what a consumer handler returns to tell the connector what
//! to do with the delivery it just processed.

use serde_json::Value;
use std::collections::BTreeMap;

/// MIME type of the body.
pub const HEADER_CONTENT_TYPE: &str = "content_type";
/// Persistence marker: 1 transient, 2 persistent.
pub const HEADER_DELIVERY_MODE: &str = "delivery_mode";
/// Unique message identifier.
pub const HEADER_MESSAGE_ID: &str = "message_id";
/// Consumer tag of the consumer that received the delivery.
pub const HEADER_CONSUMER_TAG: &str = "consumer_tag";
/// Broker assigned delivery tag.
pub const HEADER_DELIVERY_TAG: &str = "delivery_tag";
/// Whether the broker delivered this message before.
pub const HEADER_REDELIVERED: &str = "redelivered";
/// Exchange the message was published to.
pub const HEADER_EXCHANGE: &str = "exchange";
/// Routing key the message was published with.
pub const HEADER_ROUTING_KEY: &str = "routing_key";
/// Size of the body in bytes.
pub const HEADER_BODY_SIZE: &str = "body_size";
/// Messages still pending in the queue, null when the broker does not say.
pub const HEADER_MESSAGE_COUNT: &str = "message_count";

/// Default content type set on publish.
pub const TEXT_PLAIN_CONTENT_TYPE: &str = "text/plain";
/// Delivery mode marking a message as persistent.
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// A message body with its headers.
///
/// The body is opaque to the connectors. Header values are JSON values and
/// map onto AMQP properties and headers on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    body: Vec<u8>,
    headers: BTreeMap<String, Value>,
}

impl Message {
    /// Creates a message without headers.
    ///
    /// # Parameters
    /// * `body` - The raw message body
    ///
    /// # Returns
    /// A new message
    pub fn new(body: impl Into<Vec<u8>>) -> Message {
        Message {
            body: body.into(),
            headers: BTreeMap::default(),
        }
    }

    /// Sets a header, replacing any previous value.
    ///
    /// # Parameters
    /// * `key` - The header name
    /// * `value` - The header value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Merges `headers` into the current headers.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_headers(mut self, headers: BTreeMap<String, Value>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Returns the message body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns all headers.
    pub fn headers(&self) -> &BTreeMap<String, Value> {
        &self.headers
    }

    /// Returns the headers for in-place changes.
    pub fn headers_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.headers
    }

    /// Returns the value of a single header, if present.
    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.get(key)
    }

    /// Sets `key` only when it is not present yet.
    pub fn default_header(&mut self, key: &str, value: impl Into<Value>) {
        self.headers
            .entry(key.to_owned())
            .or_insert_with(|| value.into());
    }
}

/// What the connector does with a delivery once a handler returned.
///
/// The three flags are independent: `requeue` only has an effect together
/// with `nack`, and `exit` stops the consumer whatever the disposition is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Reject the delivery instead of acknowledging it.
    pub nack: bool,
    /// Put a rejected delivery back on the queue.
    pub requeue: bool,
    /// Stop the consumer once the delivery is settled.
    pub exit: bool,
}

/// The acknowledgement sent for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack { requeue: bool },
}

impl Outcome {
    /// Acknowledge the delivery.
    pub const fn ack() -> Outcome {
        Outcome {
            nack: false,
            requeue: false,
            exit: false,
        }
    }

    /// Reject the delivery without requeueing it. With a dead letter queue
    /// configured the broker routes it there.
    pub const fn nack() -> Outcome {
        Outcome {
            nack: true,
            requeue: false,
            exit: false,
        }
    }

    /// Reject the delivery and put it back on the queue.
    pub const fn requeue() -> Outcome {
        Outcome {
            nack: true,
            requeue: true,
            exit: false,
        }
    }

    /// Acknowledge the delivery and stop the consumer.
    pub const fn exit() -> Outcome {
        Outcome {
            nack: false,
            requeue: false,
            exit: true,
        }
    }

    /// Same disposition, and stop the consumer afterwards.
    pub const fn and_exit(mut self) -> Outcome {
        self.exit = true;
        self
    }

    /// Maps the flags to the acknowledgement to send.
    ///
    /// # Returns
    /// `Nack` carrying the `requeue` flag when `nack` is set, `Ack` otherwise
    pub fn disposition(&self) -> Disposition {
        if self.nack {
            Disposition::Nack {
                requeue: self.requeue,
            }
        } else {
            Disposition::Ack
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
