//! TOML configuration for the exchange client.
//!
//! ```toml
//! connection_factory = "messaging"
//! connect_timeout_secs = 300
//!
//! [endpoints.messaging]
//! url = "mqtt://localhost:1883"
//!
//! [queues]
//! orders = "orders"
//!
//! [topics]
//! events = "events"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ReceiveConfig, SendConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FACTORY_NAME};
use crate::ClientError;

/// Overrides the URL of the selected connection factory.
pub const ENV_URL: &str = "SMOKETEST_URL";
/// Overrides `connect_timeout_secs`.
pub const ENV_CONNECT_TIMEOUT: &str = "SMOKETEST_CONNECT_TIMEOUT_SECS";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Lookup name of the connection factory the client uses.
    pub connection_factory: String,
    pub connect_timeout_secs: u64,
    pub endpoints: BTreeMap<String, EndpointConfig>,
    /// Lookup name -> queue address.
    pub queues: BTreeMap<String, String>,
    /// Lookup name -> topic address.
    pub topics: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_factory: DEFAULT_FACTORY_NAME.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            endpoints: BTreeMap::new(),
            queues: BTreeMap::new(),
            topics: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    5
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Config {
    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), endpoints = config.endpoints.len(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ClientError> {
        toml::from_str(raw).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ClientError> {
        toml::to_string(self).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Apply `SMOKETEST_URL` and `SMOKETEST_CONNECT_TIMEOUT_SECS` if set.
    pub fn apply_env(&mut self) -> Result<(), ClientError> {
        self.apply_overrides(
            std::env::var(ENV_URL).ok(),
            std::env::var(ENV_CONNECT_TIMEOUT).ok(),
        )
    }

    fn apply_overrides(
        &mut self,
        url: Option<String>,
        timeout_secs: Option<String>,
    ) -> Result<(), ClientError> {
        if let Some(url) = url {
            self.set_url(url);
        }
        if let Some(secs) = timeout_secs {
            self.connect_timeout_secs = secs.trim().parse().map_err(|_| {
                ClientError::Config(format!("{} must be a number of seconds", ENV_CONNECT_TIMEOUT))
            })?;
        }
        Ok(())
    }

    /// Point the selected connection factory at `url`, keeping its other settings.
    pub fn set_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.endpoints
            .entry(self.connection_factory.clone())
            .and_modify(|endpoint| endpoint.url = url.clone())
            .or_insert_with(|| EndpointConfig::new(url));
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn send_config(&self) -> SendConfig {
        SendConfig::default().connect_timeout(self.connect_timeout())
    }

    pub fn receive_config(&self) -> ReceiveConfig {
        ReceiveConfig::default().connect_timeout(self.connect_timeout())
    }

    /// Build a lookup context with one factory per endpoint and every
    /// configured queue and topic bound.
    #[cfg(feature = "mqtt")]
    pub fn naming_context(&self) -> Result<crate::bus::NamingContext, ClientError> {
        use crate::mqtt::MqttConnectionFactory;

        let mut context = crate::bus::NamingContext::new();
        for (name, endpoint) in &self.endpoints {
            let mut factory = MqttConnectionFactory::from_url(&endpoint.url)?
                .with_keep_alive(Duration::from_secs(endpoint.keep_alive_secs));
            if let Some(username) = &endpoint.username {
                factory = factory.with_credentials(
                    username.clone(),
                    endpoint.password.clone().unwrap_or_default(),
                );
            }
            context = context.bind_factory(name.clone(), factory);
        }
        for (name, address) in &self.queues {
            context = context.bind_queue(name.clone(), address.clone());
        }
        for (name, address) in &self.topics {
            context = context.bind_topic(name.clone(), address.clone());
        }
        Ok(context)
    }
}
