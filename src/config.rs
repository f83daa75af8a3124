// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connector Configuration
//!
//! Settings shared by every connector. They can be built in code or loaded
//! with [`ConnectorConfig::load`] from an optional file followed by `MQ__`
//! prefixed environment variables (`MQ__CONNECTION_POLICY=pooled`).

use crate::errors::MessagingError;
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`ConnectorConfig::load`].
pub const ENV_PREFIX: &str = "MQ";

/// How a connector obtains transport connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPolicy {
    /// Every publish and consume opens its own connection and closes it when done.
    #[default]
    PerCall,
    /// One lazily opened connection per connector, reopened once it drops.
    /// Channels are still opened and closed per call.
    Pooled,
}

/// Settings shared by every connector built from a registry.
///
/// Missing fields take their default values when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Name reported to the broker for every connection.
    pub connection_name: String,
    /// Whether connections are opened per call or shared.
    pub connection_policy: ConnectionPolicy,
    /// Unacknowledged deliveries a consumer may hold, unlimited when absent.
    pub prefetch_count: Option<u16>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            connection_name: env!("CARGO_PKG_NAME").to_owned(),
            connection_policy: ConnectionPolicy::PerCall,
            prefetch_count: None,
        }
    }
}

impl ConnectorConfig {
    /// Loads the configuration from the defaults, then the file at `path` when
    /// given, then the environment.
    ///
    /// # Parameters
    /// * `path` - Optional configuration file; its format follows the extension
    ///
    /// # Returns
    /// The merged configuration, or `MessagingError::Configuration` when the
    /// file is missing or a value does not parse
    pub fn load(path: Option<&str>) -> Result<ConnectorConfig, MessagingError> {
        let defaults = config::Config::try_from(&ConnectorConfig::default())
            .map_err(|err| MessagingError::Configuration(err.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|err| MessagingError::Configuration(err.to_string()))
    }

    /// Sets the connection policy.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_connection_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.connection_policy = policy;
        self
    }

    /// Limits the unacknowledged deliveries per consumer.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_prefetch_count(mut self, count: u16) -> Self {
        self.prefetch_count = Some(count);
        self
    }

    /// Sets the name reported to the broker.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
