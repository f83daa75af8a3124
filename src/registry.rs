// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connector Registry
//!
//! Maps URI schemes to connector factories. Schemes are matched exactly, so
//! `AMQP://` is not served by the connector registered for `amqp`.

use crate::{
    amqp::RabbitMQConnector, config::ConnectorConfig, connector::Connector,
    errors::MessagingError, uri::ConnectionUri,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error};

/// Builds a connector for a parsed URI.
pub type ConnectorFactory = Arc<
    dyn Fn(ConnectionUri, ConnectorConfig) -> Result<Arc<dyn Connector>, MessagingError>
        + Send
        + Sync,
>;

/// Registry resolving connection URIs to connectors.
///
/// The default registry serves `amqp` and `amqps` with [`RabbitMQConnector`].
/// Further schemes are added with [`ConnectorRegistry::register`].
#[derive(Clone)]
pub struct ConnectorRegistry {
    factories: BTreeMap<String, ConnectorFactory>,
    config: ConnectorConfig,
}

impl Default for ConnectorRegistry {
    /// A registry serving `amqp` and `amqps` with the default configuration.
    fn default() -> Self {
        ConnectorRegistry::empty().register(RabbitMQConnector::SCHEMES, RabbitMQConnector::factory)
    }
}

impl ConnectorRegistry {
    /// Creates a registry serving no scheme.
    ///
    /// # Returns
    /// An empty registry with the default configuration
    pub fn empty() -> ConnectorRegistry {
        ConnectorRegistry {
            factories: BTreeMap::new(),
            config: ConnectorConfig::default(),
        }
    }

    /// Sets the configuration handed to every connector built by this registry.
    ///
    /// # Parameters
    /// * `config` - The connector configuration
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_config(mut self, config: ConnectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Serves `schemes` with `factory`, replacing earlier registrations.
    ///
    /// # Parameters
    /// * `schemes` - The URI schemes, matched exactly
    /// * `factory` - Builds a connector out of the parsed URI and the configuration
    ///
    /// # Returns
    /// Self for method chaining
    pub fn register<F>(mut self, schemes: &[&str], factory: F) -> Self
    where
        F: Fn(ConnectionUri, ConnectorConfig) -> Result<Arc<dyn Connector>, MessagingError>
            + Send
            + Sync
            + 'static,
    {
        let factory: ConnectorFactory = Arc::new(factory);

        for scheme in schemes {
            self.factories.insert((*scheme).to_owned(), factory.clone());
        }

        self
    }

    /// Returns the registered schemes in lexical order.
    pub fn schemes(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Returns the configuration handed to factories.
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Parses `uri` and builds the connector registered for its scheme.
    ///
    /// # Parameters
    /// * `uri` - The connection URI text
    ///
    /// # Returns
    /// The connector, `MessagingError::InvalidUri` for an unparsable URI,
    /// `MessagingError::UnsupportedScheme` when no factory serves the scheme,
    /// or the factory's own error
    pub fn resolve(&self, uri: &str) -> Result<Arc<dyn Connector>, MessagingError> {
        let parsed = ConnectionUri::parse(uri)?;

        let Some(factory) = self.factories.get(parsed.scheme()) else {
            error!(scheme = parsed.scheme(), "no connector for scheme");
            return Err(MessagingError::UnsupportedScheme(parsed.scheme().to_owned()));
        };

        debug!("resolving connector for: {}", parsed.redacted());
        factory(parsed, self.config.clone())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
