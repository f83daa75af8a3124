// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module establishes lapin connections out of a [`ConnectionUri`] and
//! implements the transport traits on top of lapin connections, channels and
//! deliveries. `amqps` connections trust the CA certificates referenced by
//! the `cafile` / `capath` URI options.

use crate::{
    amqp::{
        errors::AmqpError,
        exchange::ExchangeDefinition,
        queue::{QueueBinding, QueueDefinition},
        transport::{
            AmqpChannel, AmqpConnection, AmqpDialer, DeliveryAcker, DeliveryStream,
            InboundDelivery,
        },
        values::{from_properties, to_field_table, to_properties},
        AMQPS_DEFAULT_PORT, AMQPS_SCHEME, AMQP_DEFAULT_PORT,
    },
    config::ConnectorConfig,
    errors::MessagingError,
    message::Message,
    uri::ConnectionUri,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    tcp::OwnedTLSConfig,
    types::{FieldTable, LongString},
    Channel, Connection, ConnectionProperties,
};
use std::{path::Path, sync::Arc};
use tracing::{debug, error};

/// URI option pointing to the CA certificates, mandatory for `amqps`.
pub const TLS_CAPATH_OPTION: &str = "capath";
/// URI option pointing to a single CA bundle, preferred over `capath`.
pub const TLS_CAFILE_OPTION: &str = "cafile";

const REPLY_SUCCESS: u16 = 200;

/// Dialer creating lapin connections.
///
/// This is the dialer every [`crate::RabbitMQConnector`] uses unless another
/// one is injected with `with_dialer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LapinDialer;

#[async_trait]
impl AmqpDialer for LapinDialer {
    async fn dial(
        &self,
        uri: &ConnectionUri,
        cfg: &ConnectorConfig,
    ) -> Result<Arc<dyn AmqpConnection>, MessagingError> {
        let conn = new_amqp_connection(uri, cfg).await?;
        Ok(Arc::new(LapinConnection { conn }))
    }
}

/// Checks the TLS options of an `amqps` URI.
///
/// The `capath` option is mandatory for `amqps` and must not be empty.
/// Plain `amqp` URIs always pass.
///
/// # Parameters
/// * `uri` - The connection URI to check
///
/// # Returns
/// Ok when the URI can be dialed, or a `MessagingError::Configuration`
/// naming the missing option
pub fn check_tls_options(uri: &ConnectionUri) -> Result<(), MessagingError> {
    if uri.scheme() != AMQPS_SCHEME {
        return Ok(());
    }

    match uri.option(TLS_CAPATH_OPTION) {
        Some(capath) if !capath.is_empty() => Ok(()),
        _ => Err(MessagingError::Configuration(format!(
            "the '{}' parameter is required for {}",
            TLS_CAPATH_OPTION, AMQPS_SCHEME
        ))),
    }
}

/// Resolves the port to connect to.
///
/// # Parameters
/// * `uri` - The connection URI
///
/// # Returns
/// The explicit port of the URI, or 5671 for `amqps` and 5672 for `amqp`
pub fn effective_port(uri: &ConnectionUri) -> u16 {
    uri.port().unwrap_or(if uri.scheme() == AMQPS_SCHEME {
        AMQPS_DEFAULT_PORT
    } else {
        AMQP_DEFAULT_PORT
    })
}

/// Renders the URI in the form lapin parses.
pub(crate) fn lapin_uri(uri: &ConnectionUri) -> String {
    format!(
        "{}://{}:{}@{}:{}/{}",
        uri.scheme(),
        urlencoding::encode(uri.username()),
        urlencoding::encode(uri.password()),
        uri.host(),
        effective_port(uri),
        urlencoding::encode(uri.vhost())
    )
}

/// Opens a new lapin connection.
///
/// TLS options are checked before any network I/O happens. `amqps`
/// connections trust the CA chain loaded from `cafile` or `capath`.
///
/// # Parameters
/// * `uri` - The broker URI, with decoded credentials and vhost
/// * `cfg` - Connector settings, providing the connection name
///
/// # Returns
/// The open connection, or a configuration, TLS or connection error
pub async fn new_amqp_connection(
    uri: &ConnectionUri,
    cfg: &ConnectorConfig,
) -> Result<Connection, MessagingError> {
    check_tls_options(uri)?;

    let tls = if uri.scheme() == AMQPS_SCHEME {
        Some(OwnedTLSConfig {
            cert_chain: Some(load_ca_chain(uri).await?),
            ..Default::default()
        })
    } else {
        None
    };

    debug!(uri = uri.redacted(), "creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.connection_name.clone()));

    let amqp_uri = lapin_uri(uri);
    let conn = match tls {
        Some(tls) => Connection::connect_with_config(&amqp_uri, options, tls).await,
        None => Connection::connect(&amqp_uri, options).await,
    };

    match conn {
        Ok(c) => {
            debug!("amqp connected");
            Ok(c)
        }
        Err(err) => {
            error!(error = err.to_string(), uri = uri.redacted(), "failure to connect");
            Err(AmqpError::ConnectionError(err.to_string()).into())
        }
    }
}

/// Reads the PEM chain referenced by `cafile`, or by `capath` (a file or a
/// directory of `.pem` / `.crt` files).
async fn load_ca_chain(uri: &ConnectionUri) -> Result<String, AmqpError> {
    if let Some(cafile) = uri.option(TLS_CAFILE_OPTION).filter(|v| !v.is_empty()) {
        return read_pem(Path::new(cafile)).await;
    }

    let capath = Path::new(uri.option(TLS_CAPATH_OPTION).unwrap_or_default());
    let metadata = tokio::fs::metadata(capath)
        .await
        .map_err(|err| AmqpError::TlsError(format!("{}: {}", capath.display(), err)))?;

    if !metadata.is_dir() {
        return read_pem(capath).await;
    }

    let mut entries = tokio::fs::read_dir(capath)
        .await
        .map_err(|err| AmqpError::TlsError(format!("{}: {}", capath.display(), err)))?;

    let mut files = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| AmqpError::TlsError(err.to_string()))?
    {
        let path = entry.path();
        let is_cert = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "pem" || ext == "crt");
        if is_cert {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(AmqpError::TlsError(format!(
            "no certificates found in {}",
            capath.display()
        )));
    }

    let mut chain = String::new();
    for file in files {
        chain.push_str(&read_pem(&file).await?);
        if !chain.ends_with('\n') {
            chain.push('\n');
        }
    }

    Ok(chain)
}

/// Reads one PEM file, mapping I/O failures to `AmqpError::TlsError`.
async fn read_pem(path: &Path) -> Result<String, AmqpError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AmqpError::TlsError(format!("{}: {}", path.display(), err)))
}

/// A lapin connection implementing [`AmqpConnection`].
///
/// Channels created from it are [`LapinChannel`]s.
pub struct LapinConnection {
    conn: Connection,
}

#[async_trait]
impl AmqpConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        debug!("creating amqp channel...");
        match self.conn.create_channel().await {
            Ok(channel) => {
                debug!("channel created");
                Ok(Arc::new(LapinChannel { channel }))
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.status().connected()
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.conn
            .close(REPLY_SUCCESS, "closing connection")
            .await
            .map_err(|err| AmqpError::CloseError(err.to_string()))
    }
}

/// A lapin channel implementing [`AmqpChannel`].
///
/// Queues and exchanges are declared durable or transient as their
/// definitions say; every other declaration flag is off.
pub struct LapinChannel {
    channel: Channel,
}

#[async_trait]
impl AmqpChannel for LapinChannel {
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        self.channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    exclusive: false,
                    auto_delete: false,
                    nowait: false,
                },
                to_field_table(def.args.iter()),
            )
            .await
            .map(|_| ())
            .map_err(|err| AmqpError::DeclareQueueError(def.name.clone(), err.to_string()))
    }

    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        self.channel
            .exchange_declare(
                &def.name,
                (&def.kind).into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| AmqpError::DeclareExchangeError(def.name.clone(), err.to_string()))
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                AmqpError::BindingExchangeToQueueError(
                    binding.queue_name.clone(),
                    binding.exchange_name.clone(),
                    err.to_string(),
                )
            })
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(|err| AmqpError::QoSDeclarationError(err.to_string()))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), AmqpError> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                message.body(),
                to_properties(message.headers()),
            )
            .await
            .map(|_| ())
            .map_err(|err| AmqpError::PublishingError(exchange.to_owned(), err.to_string()))
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| AmqpError::BindingConsumerError(consumer_tag.to_owned(), err.to_string()))?;

        Ok(consumer
            .map(|result| match result {
                Ok(delivery) => Ok(into_inbound(delivery)),
                Err(err) => Err(AmqpError::ConsumerError(err.to_string())),
            })
            .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|err| AmqpError::CancelConsumerError(consumer_tag.to_owned(), err.to_string()))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.channel
            .close(REPLY_SUCCESS, "closing channel")
            .await
            .map_err(|err| AmqpError::CloseError(err.to_string()))
    }
}

/// Converts a lapin delivery into an [`InboundDelivery`].
///
/// Pushed deliveries carry no message count.
fn into_inbound(delivery: Delivery) -> InboundDelivery {
    let headers = from_properties(&delivery.properties);

    InboundDelivery {
        delivery_tag: delivery.delivery_tag,
        redelivered: delivery.redelivered,
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        message_count: None,
        message: Message::new(delivery.data).with_headers(headers),
        acker: Box::new(LapinAcker {
            acker: delivery.acker,
        }),
    }
}

struct LapinAcker {
    acker: Acker,
}

#[async_trait]
impl DeliveryAcker for LapinAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        self.acker
            .ack(BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(|err| AmqpError::AckMessageError(err.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), AmqpError> {
        self.acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map(|_| ())
            .map_err(|err| AmqpError::NackMessageError(err.to_string()))
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
