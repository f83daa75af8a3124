// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::{message::Message, queue::Queue};
use std::sync::Arc;

/// A message addressed to a queue.
///
/// Callers build one to publish. Consumers receive one per delivery, where the
/// queue is the normalized descriptor the consumer was started with.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    queue: Arc<Queue>,
    message: Message,
}

impl Envelope {
    /// Creates an envelope.
    ///
    /// # Parameters
    /// * `queue` - The destination queue
    /// * `message` - The message to deliver there
    pub fn new(queue: impl Into<Arc<Queue>>, message: Message) -> Envelope {
        Envelope {
            queue: queue.into(),
            message,
        }
    }

    /// Returns the queue descriptor.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Returns the message.
    pub fn message(&self) -> &Message {
        &self.message
    }
}
