// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! The receive loop of a consumer and the handling of every single delivery.
//!
//! For each delivery the consumer:
//! 1. Rebuilds the message headers from the delivery properties and adds the
//!    broker metadata (consumer tag, delivery tag, redelivered flag, ...)
//! 2. Opens a consumer trace span parented by the propagated context
//! 3. Runs the receive handler; if it fails or panics, runs the error handler
//! 4. Acks or nacks the delivery following the returned outcome
//! 5. Stops the loop when the outcome carries the exit flag
//!
//! The loop also stops when the delivery stream ends or when shutdown is
//! requested. Teardown of the channel and connection is left to the caller.

use crate::{
    amqp::{
        errors::AmqpError,
        transport::{AmqpChannel, DeliveryAcker, DeliveryStream, InboundDelivery},
    },
    envelope::Envelope,
    errors::MessagingError,
    handler::{ErrorHandler, HandlerError, HandlerResult, ReceiveHandler},
    message::{
        Disposition, Outcome, HEADER_BODY_SIZE, HEADER_CONSUMER_TAG, HEADER_DELIVERY_TAG,
        HEADER_EXCHANGE, HEADER_MESSAGE_COUNT, HEADER_REDELIVERED, HEADER_ROUTING_KEY,
    },
    otel,
    queue::Queue,
    shutdown::Shutdown,
};
use futures_util::{FutureExt, StreamExt};
use opentelemetry::{
    global::BoxedTracer,
    trace::{FutureExt as _, Status, TraceContextExt},
};
use serde_json::Value;
use std::{any::Any, borrow::Cow, future::Future, panic::AssertUnwindSafe, sync::Arc};
use tracing::{debug, error, warn};

/// Why a receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// A handler returned an outcome with the exit flag; the consumer was cancelled.
    Cancelled,
    /// The broker stopped delivering (consumer cancelled or channel closed).
    StreamEnded,
    /// Shutdown was requested.
    Shutdown,
}

/// What the loop does after one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopControl {
    Continue,
    Exit,
}

/// A registered consumer bound to one provisioned channel.
///
/// Handlers are borrowed from the caller for the lifetime of the loop.
pub(crate) struct Consumer<'h> {
    pub(crate) channel: Arc<dyn AmqpChannel>,
    pub(crate) queue: Arc<Queue>,
    pub(crate) consumer_tag: String,
    pub(crate) on_receive: &'h dyn ReceiveHandler,
    pub(crate) on_error: &'h dyn ErrorHandler,
}

impl Consumer<'_> {
    /// Processes deliveries one at a time until the loop has to stop.
    ///
    /// On exit the consumer tag is cancelled before returning. When the error
    /// handler fails the cancel is attempted and its failure only logged.
    ///
    /// # Parameters
    /// * `deliveries` - The delivery stream registered for `consumer_tag`
    /// * `shutdown` - The hook stopping the loop between deliveries
    ///
    /// # Returns
    /// Why the loop stopped, or the error that stopped it
    pub(crate) async fn run(
        &self,
        mut deliveries: DeliveryStream,
        mut shutdown: Shutdown,
    ) -> Result<ConsumerExit, MessagingError> {
        let tracer = otel::tracer();
        let shutdown_requested = shutdown.requested();
        tokio::pin!(shutdown_requested);

        loop {
            tokio::select! {
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        let control = consume(
                            &tracer,
                            delivery,
                            &self.queue,
                            &self.consumer_tag,
                            self.on_receive,
                            self.on_error,
                        )
                        .await;

                        match control {
                            Ok(LoopControl::Continue) => {}
                            Ok(LoopControl::Exit) => {
                                debug!(consumer_tag = self.consumer_tag.as_str(), "exit requested, cancelling consumer");
                                self.cancel().await?;
                                return Ok(ConsumerExit::Cancelled);
                            }
                            Err(err) => {
                                if matches!(err, MessagingError::ErrorHandlerFailed(_)) {
                                    if let Err(cancel_err) = self.cancel().await {
                                        warn!(error = cancel_err.to_string(), "failure to cancel consumer");
                                    }
                                }
                                return Err(err);
                            }
                        }
                    }
                    Some(Err(err)) => {
                        error!(error = err.to_string(), "errors consume msg");
                        return Err(err.into());
                    }
                    None => {
                        debug!(consumer_tag = self.consumer_tag.as_str(), "delivery stream ended");
                        return Ok(ConsumerExit::StreamEnded);
                    }
                },
                _ = &mut shutdown_requested => {
                    warn!(consumer_tag = self.consumer_tag.as_str(), "shutdown requested, stopping consumer");
                    return Ok(ConsumerExit::Shutdown);
                }
            }
        }
    }

    async fn cancel(&self) -> Result<(), AmqpError> {
        self.channel.cancel(&self.consumer_tag).await.inspect_err(|err| {
            error!(error = err.to_string(), consumer_tag = self.consumer_tag.as_str(), "failure to cancel consumer");
        })
    }
}

/// Handles a single delivery and settles it.
///
/// The consumer span is the active context while the handlers run. A handler
/// returning `None` acks the delivery.
///
/// # Parameters
/// * `tracer` - The tracer for the consumer span
/// * `delivery` - The delivery to handle
/// * `queue` - The normalized queue the consumer reads from
/// * `consumer_tag` - The tag the consumer was registered with
/// * `on_receive` - The handler run first
/// * `on_error` - The handler run when `on_receive` fails or panics
///
/// # Returns
/// Whether the loop continues, [`MessagingError::ErrorHandlerFailed`] when
/// the error handler fails too (the delivery is left unsettled), or the
/// settle error
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    delivery: InboundDelivery,
    queue: &Arc<Queue>,
    consumer_tag: &str,
    on_receive: &dyn ReceiveHandler,
    on_error: &dyn ErrorHandler,
) -> Result<LoopControl, MessagingError> {
    let InboundDelivery {
        delivery_tag,
        redelivered,
        exchange,
        routing_key,
        message_count,
        message,
        acker,
    } = delivery;

    let body_size = message.body().len();
    let message = message
        .with_header(HEADER_CONSUMER_TAG, consumer_tag)
        .with_header(HEADER_DELIVERY_TAG, delivery_tag)
        .with_header(HEADER_REDELIVERED, redelivered)
        .with_header(HEADER_EXCHANGE, exchange.as_str())
        .with_header(HEADER_ROUTING_KEY, routing_key.as_str())
        .with_header(HEADER_BODY_SIZE, body_size)
        .with_header(
            HEADER_MESSAGE_COUNT,
            message_count.map(Value::from).unwrap_or(Value::Null),
        );

    let ctx = otel::new_span(message.headers(), tracer, queue.name());
    let span = ctx.span();

    debug!(
        delivery_tag,
        redelivered,
        "received: {} - exchange: {}",
        queue.name(),
        exchange
    );

    let envelope = Envelope::new(queue.clone(), message);

    let outcome = match guarded(on_receive.on_receive(&envelope))
        .with_context(ctx.clone())
        .await
    {
        Ok(outcome) => outcome,
        Err(failure) => {
            warn!(error = failure.to_string(), delivery_tag, "error whiling handling msg");
            span.record_error(&failure);

            match guarded(on_error.on_error(&envelope, &failure))
                .with_context(ctx.clone())
                .await
            {
                Ok(outcome) => outcome,
                Err(second) => {
                    error!(
                        error = second.to_string(),
                        delivery_tag, "error handler failed, stopping consumer"
                    );
                    span.record_error(&second);
                    span.set_status(Status::Error {
                        description: Cow::from("error handler failed"),
                    });
                    return Err(MessagingError::ErrorHandlerFailed(second.to_string()));
                }
            }
        }
    };

    let outcome = outcome.unwrap_or_default();

    if let Err(err) = settle(acker.as_ref(), &outcome).await {
        span.record_error(&err);
        span.set_status(Status::Error {
            description: Cow::from("error to settle msg"),
        });
        return Err(err.into());
    }

    span.set_status(Status::Ok);

    Ok(if outcome.exit {
        LoopControl::Exit
    } else {
        LoopControl::Continue
    })
}

/// Acks or nacks a delivery following an outcome.
///
/// # Parameters
/// * `acker` - The acker of the delivery
/// * `outcome` - The outcome returned by a handler
///
/// # Returns
/// Ok once the broker accepted the ack or nack, or the AmqpError
pub(crate) async fn settle(acker: &dyn DeliveryAcker, outcome: &Outcome) -> Result<(), AmqpError> {
    match outcome.disposition() {
        Disposition::Ack => {
            debug!("message successfully processed");
            acker.ack().await.inspect_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
            })
        }
        Disposition::Nack { requeue } => {
            debug!(requeue, "rejecting message");
            acker.nack(requeue).await.inspect_err(|err| {
                error!(error = err.to_string(), "error whiling nack msg");
            })
        }
    }
}

/// Runs a handler future, turning a panic into a [`HandlerError`].
async fn guarded<F>(handler: F) -> HandlerResult
where
    F: Future<Output = HandlerResult>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    }
}

/// Extracts the payload of a panic raised with a string message.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
