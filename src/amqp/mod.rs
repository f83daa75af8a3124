// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Connector
//!
//! [`RabbitMQConnector`] serves the `amqp` and `amqps` schemes on top of
//! lapin. Every operation provisions the topology of its queue first.
//!
//! With [`ConnectionPolicy::PerCall`] each publish or consume opens its own
//! connection and closes it when done. With [`ConnectionPolicy::Pooled`] one
//! connection is shared and reopened when the broker dropped it.

mod consumer;

pub mod channel;
pub mod errors;
pub mod exchange;
pub mod publisher;
pub mod queue;
pub mod topology;
pub mod transport;
pub mod values;

#[cfg(test)]
pub(crate) mod testing;

pub use consumer::ConsumerExit;

use crate::{
    config::{ConnectionPolicy, ConnectorConfig},
    connector::Connector,
    envelope::Envelope,
    errors::MessagingError,
    handler::{ErrorHandler, ReceiveHandler},
    queue::Queue,
    shutdown::Shutdown,
    uri::ConnectionUri,
};
use async_trait::async_trait;
use channel::{check_tls_options, LapinDialer};
use consumer::Consumer;
use errors::AmqpError;
use std::sync::Arc;
use tokio::sync::Mutex;
use topology::provision_normalized;
use tracing::{debug, error, info, warn};
use transport::{AmqpChannel, AmqpConnection, AmqpDialer, DeliveryStream};

pub const AMQP_SCHEME: &str = "amqp";
pub const AMQPS_SCHEME: &str = "amqps";
pub const AMQP_DEFAULT_PORT: u16 = 5672;
pub const AMQPS_DEFAULT_PORT: u16 = 5671;

/// Connector serving `amqp` and `amqps` URIs on top of lapin.
///
/// Built by the default [`crate::ConnectorRegistry`], or directly with
/// [`RabbitMQConnector::new`].
pub struct RabbitMQConnector {
    uri: ConnectionUri,
    cfg: ConnectorConfig,
    dialer: Arc<dyn AmqpDialer>,
    shutdown: Shutdown,
    pooled: Mutex<Option<Arc<dyn AmqpConnection>>>,
}

impl RabbitMQConnector {
    /// Schemes served by this connector.
    pub const SCHEMES: &'static [&'static str] = &[AMQP_SCHEME, AMQPS_SCHEME];

    /// Creates a connector for a parsed URI.
    ///
    /// No connection is opened yet.
    ///
    /// # Parameters
    /// * `uri` - An `amqp` or `amqps` URI; `amqps` requires the `capath` option
    /// * `cfg` - Connector settings
    ///
    /// # Returns
    /// The connector, `MessagingError::UnsupportedScheme` for other schemes,
    /// or `MessagingError::Configuration` when TLS options are missing
    pub fn new(uri: ConnectionUri, cfg: ConnectorConfig) -> Result<RabbitMQConnector, MessagingError> {
        if !Self::SCHEMES.contains(&uri.scheme()) {
            return Err(MessagingError::UnsupportedScheme(uri.scheme().to_owned()));
        }
        check_tls_options(&uri)?;

        Ok(RabbitMQConnector {
            uri,
            cfg,
            dialer: Arc::new(LapinDialer),
            shutdown: Shutdown::default(),
            pooled: Mutex::new(None),
        })
    }

    /// Registry factory building a [`RabbitMQConnector`] behind a trait object.
    ///
    /// # Parameters
    /// * `uri` - The parsed URI
    /// * `cfg` - Connector settings
    ///
    /// # Returns
    /// The connector, or the error of [`RabbitMQConnector::new`]
    pub fn factory(uri: ConnectionUri, cfg: ConnectorConfig) -> Result<Arc<dyn Connector>, MessagingError> {
        Ok(Arc::new(RabbitMQConnector::new(uri, cfg)?))
    }

    /// Replaces the lapin dialer, for instance with an in-memory broker.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_dialer(mut self, dialer: Arc<dyn AmqpDialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Replaces the default Ctrl-C / SIGTERM shutdown hook of consumers.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Returns the URI the connector dials.
    pub fn uri(&self) -> &ConnectionUri {
        &self.uri
    }

    /// Returns the connector settings.
    pub fn config(&self) -> &ConnectorConfig {
        &self.cfg
    }

    /// Returns a connection following the connection policy.
    async fn connection(&self) -> Result<Arc<dyn AmqpConnection>, MessagingError> {
        match self.cfg.connection_policy {
            ConnectionPolicy::PerCall => self.dial().await,
            ConnectionPolicy::Pooled => {
                let mut pooled = self.pooled.lock().await;

                if let Some(conn) = pooled.as_ref().filter(|conn| conn.is_connected()) {
                    return Ok(conn.clone());
                }

                let conn = self.dial().await?;
                *pooled = Some(conn.clone());
                Ok(conn)
            }
        }
    }

    async fn dial(&self) -> Result<Arc<dyn AmqpConnection>, MessagingError> {
        check_tls_options(&self.uri)?;
        debug!("connecting to: {}", self.uri.redacted());

        self.dialer.dial(&self.uri, &self.cfg).await.inspect_err(|err| {
            error!(error = err.to_string(), uri = self.uri.redacted(), "failure to connect");
        })
    }

    /// Applies the prefetch count, then registers the consumer.
    async fn register(
        &self,
        channel: &dyn AmqpChannel,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, AmqpError> {
        if let Some(prefetch_count) = self.cfg.prefetch_count {
            channel.qos(prefetch_count).await?;
        }

        channel.consume(queue, consumer_tag).await
    }

    /// Closes `channel`, then the connection unless it is pooled.
    ///
    /// Both are attempted; the first failure is returned.
    async fn release(
        &self,
        channel: Option<&Arc<dyn AmqpChannel>>,
        connection: &Arc<dyn AmqpConnection>,
    ) -> Result<(), AmqpError> {
        let mut result = Ok(());

        if let Some(channel) = channel {
            if let Err(err) = channel.close().await {
                warn!(error = err.to_string(), "failure to close channel");
                result = Err(err);
            }
        }

        if self.cfg.connection_policy == ConnectionPolicy::PerCall {
            if let Err(err) = connection.close().await {
                warn!(error = err.to_string(), "failure to close connection");
                result = result.and(Err(err));
            }
        }

        result
    }
}

#[async_trait]
impl Connector for RabbitMQConnector {
    fn schema(&self) -> &'static [&'static str] {
        Self::SCHEMES
    }

    async fn connect(&self) -> Result<(), MessagingError> {
        let connection = self.connection().await?;
        self.release(None, &connection).await?;

        info!("broker reachable at: {}", self.uri.redacted());
        Ok(())
    }

    async fn publish(&self, envelope: &Envelope) -> Result<(), MessagingError> {
        let queue = envelope.queue().normalized()?;
        let message = publisher::outgoing_message(envelope.message());

        let connection = self.connection().await?;
        let published = publisher::publish(connection.as_ref(), &queue, &message).await;
        let released = self.release(None, &connection).await;

        published?;
        released?;

        Ok(())
    }

    async fn consume(
        &self,
        queue: &Queue,
        on_receive: Arc<dyn ReceiveHandler>,
        on_error: Arc<dyn ErrorHandler>,
        identification: Option<&str>,
    ) -> Result<(), MessagingError> {
        let queue = Arc::new(queue.normalized()?);
        let consumer_tag = identification.unwrap_or(queue.name()).to_owned();

        let connection = self.connection().await?;

        let topology = match provision_normalized(connection.as_ref(), &queue).await {
            Ok(topology) => topology,
            Err(err) => {
                let _ = self.release(None, &connection).await;
                return Err(err.into());
            }
        };
        let channel = topology.channel;

        let deliveries = match self.register(channel.as_ref(), queue.name(), &consumer_tag).await {
            Ok(deliveries) => deliveries,
            Err(err) => {
                error!(error = err.to_string(), "failure to register consumer");
                let _ = self.release(Some(&channel), &connection).await;
                return Err(err.into());
            }
        };

        info!(consumer_tag = consumer_tag.as_str(), "consuming queue: {}", queue.name());

        let consumer = Consumer {
            channel: channel.clone(),
            queue: queue.clone(),
            consumer_tag,
            on_receive: on_receive.as_ref(),
            on_error: on_error.as_ref(),
        };

        let exit = consumer.run(deliveries, self.shutdown.clone()).await;
        let released = self.release(Some(&channel), &connection).await;

        match exit {
            Ok(ConsumerExit::Cancelled) => {
                debug!("consumer of: {} cancelled", queue.name());
                released.map_err(MessagingError::from)
            }
            Ok(reason) => {
                debug!(?reason, "consumer of: {} stopped", queue.name());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;
