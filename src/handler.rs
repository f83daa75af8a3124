// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handlers
//!
//! A consumer is driven by two handlers. The `ReceiveHandler` processes every
//! delivery; when it fails, the `ErrorHandler` gets the envelope together with
//! the failure and decides the fate of the delivery instead.
//!
//! Both return an optional [`Outcome`]; `None` acknowledges the delivery.
//! Plain closures with the right signature implement both traits:
//!
//! ```
//! use message_queue_client::{Envelope, HandlerResult, Outcome};
//!
//! let on_receive = |envelope: &Envelope| -> HandlerResult {
//!     if envelope.message().body().is_empty() {
//!         return Ok(Some(Outcome::nack()));
//!     }
//!     Ok(None)
//! };
//! # let _ = on_receive;
//! ```

use crate::{envelope::Envelope, message::Outcome};
use async_trait::async_trait;
use thiserror::Error;

/// Result returned by consumer handlers.
pub type HandlerResult = Result<Option<Outcome>, HandlerError>;

/// A failure raised while handling a delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler returned an error
    #[error("{0}")]
    Failed(String),

    /// The handler panicked
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Creates a [`HandlerError::Failed`].
    ///
    /// # Parameters
    /// * `msg` - What went wrong
    pub fn failed(msg: impl Into<String>) -> HandlerError {
        HandlerError::Failed(msg.into())
    }
}

/// Processes delivered envelopes.
#[async_trait]
pub trait ReceiveHandler: Send + Sync {
    /// Handles one delivery.
    ///
    /// # Returns
    /// The outcome to apply, `None` to acknowledge, or the failure handed to
    /// the error handler
    async fn on_receive(&self, envelope: &Envelope) -> HandlerResult;
}

/// Decides what happens to a delivery whose `ReceiveHandler` failed.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Handles a delivery whose receive handler failed or panicked.
    ///
    /// # Returns
    /// The outcome to apply, `None` to acknowledge. A failure stops the
    /// consumer and leaves the delivery unsettled.
    async fn on_error(&self, envelope: &Envelope, failure: &HandlerError) -> HandlerResult;
}

#[async_trait]
impl<F> ReceiveHandler for F
where
    F: Fn(&Envelope) -> HandlerResult + Send + Sync,
{
    async fn on_receive(&self, envelope: &Envelope) -> HandlerResult {
        self(envelope)
    }
}

#[async_trait]
impl<F> ErrorHandler for F
where
    F: Fn(&Envelope, &HandlerError) -> HandlerResult + Send + Sync,
{
    async fn on_error(&self, envelope: &Envelope, failure: &HandlerError) -> HandlerResult {
        self(envelope, failure)
    }
}
