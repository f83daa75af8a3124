// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! Publishing provisions the topology of the target queue, then sends the
//! message to the queue's exchange using the queue name as routing key.
//! Outgoing messages are persistent `text/plain` messages with a fresh
//! message id unless the caller set those headers, and carry the current
//! OpenTelemetry context.

use crate::{
    amqp::{topology::provision_normalized, transport::AmqpConnection},
    errors::MessagingError,
    message::{
        Message, DELIVERY_MODE_PERSISTENT, HEADER_CONTENT_TYPE, HEADER_DELIVERY_MODE,
        HEADER_MESSAGE_ID, TEXT_PLAIN_CONTENT_TYPE,
    },
    otel,
    queue::Queue,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Builds the message actually sent to the broker.
///
/// Sets `content_type` to `text/plain`, `delivery_mode` to persistent and a
/// random v4 `message_id`, then injects the current trace context. Headers
/// already present on the message are never overridden.
///
/// # Parameters
/// * `message` - The caller's message, left untouched
///
/// # Returns
/// A copy of the message with the publish defaults
pub fn outgoing_message(message: &Message) -> Message {
    let mut outgoing = message.clone();

    outgoing.default_header(HEADER_CONTENT_TYPE, TEXT_PLAIN_CONTENT_TYPE);
    outgoing.default_header(HEADER_DELIVERY_MODE, DELIVERY_MODE_PERSISTENT);
    outgoing.default_header(HEADER_MESSAGE_ID, Uuid::new_v4().to_string());
    otel::inject_current(outgoing.headers_mut());

    outgoing
}

/// Provisions `queue` on `connection` and publishes `message` to it.
///
/// `queue` must be normalized. The channel used is closed whatever happens;
/// the connection is left open.
///
/// # Parameters
/// * `connection` - An open connection to the broker
/// * `queue` - The normalized target queue
/// * `message` - The outgoing message, see [`outgoing_message`]
///
/// # Returns
/// The provisioning or publish error first, then the channel close error
pub(crate) async fn publish(
    connection: &dyn AmqpConnection,
    queue: &Queue,
    message: &Message,
) -> Result<(), MessagingError> {
    let topology = provision_normalized(connection, queue).await?;

    debug!(
        "publishing to exchange: {} with key: {}",
        topology.exchange, topology.queue
    );

    let published = topology
        .channel
        .publish(&topology.exchange, &topology.queue, message)
        .await;

    if let Err(err) = &published {
        error!(error = err.to_string(), "error publishing message");
    }

    let closed = topology.channel.close().await;
    if let Err(err) = &closed {
        warn!(error = err.to_string(), "failure to close channel");
    }

    published?;
    closed?;

    Ok(())
}

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;
