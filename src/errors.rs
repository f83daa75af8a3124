// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Messaging Client
//!
//! `MessagingError` is the error every connector operation returns. Configuration
//! problems are detected before any network I/O, transport and topology failures
//! are wrapped from the protocol specific error type.

use crate::amqp::errors::AmqpError;
use thiserror::Error;

/// Represents errors that can occur while resolving a connector, provisioning
/// topology, publishing or consuming.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MessagingError {
    /// No registered connector serves the scheme of the connection URI
    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),

    /// The connection URI could not be parsed
    #[error("invalid connection uri: {0}")]
    InvalidUri(String),

    /// Connector configuration is incomplete or inconsistent
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The queue descriptor is not usable (for example an empty name)
    #[error("invalid queue descriptor: {0}")]
    InvalidQueue(String),

    /// The dead letter chain of a queue descriptor revisits a queue name
    #[error("dead letter chain revisits queue `{0}`")]
    DeadLetterCycle(String),

    /// The error handler of a consumer failed while handling a delivery
    #[error("error handler failed: {0}")]
    ErrorHandlerFailed(String),

    /// Transport, topology or delivery failure reported by the AMQP layer
    #[error(transparent)]
    Amqp(#[from] AmqpError),
}
