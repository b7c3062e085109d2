//! Checkout configuration.
//!
//! Values come from the application, either built in code or loaded from
//! environment variables with [`CheckoutConfig::from_env`].

use crate::types::ChargeId;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default commerce host serving receipt pages.
pub const DEFAULT_COMMERCE_HOST: &str = "commerce.coinbase.com";

/// Fixed funding reference offered on insufficient balance.
pub const DEFAULT_FUNDING_URL: &str = "https://keys.coinbase.com/fund";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The commerce host is empty or contains a scheme or path
    #[error("invalid commerce host: {0:?}")]
    InvalidCommerceHost(String),

    /// The funding reference is not an https URL
    #[error("funding URL must use https: {0:?}")]
    InsecureFundingUrl(String),

    /// Polling would spin
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// Checkout runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Host serving `https://<host>/pay/<charge>/receipt`
    pub commerce_host: String,

    /// Funding reference opened from the `insufficient_balance` state
    pub funding_url: String,

    /// Connector the wallet prompt should prefer (e.g. `coinbaseWalletSDK`)
    pub preferred_connector: Option<String>,

    /// Delay between submission status polls.
    ///
    /// Default: 1 second
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Capacity of the action broadcast channel.
    ///
    /// Default: 16
    pub broadcast_capacity: usize,

    /// How long teardown waits for outstanding effects.
    ///
    /// Default: 5 seconds
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
}

impl CheckoutConfig {
    /// Configuration with the given commerce host and defaults elsewhere
    pub fn new(commerce_host: impl Into<String>) -> Self {
        Self {
            commerce_host: commerce_host.into(),
            ..Self::default()
        }
    }

    /// Load from `CHECKOUT_*` environment variables.
    ///
    /// Unset variables take their defaults; malformed numbers are logged and
    /// replaced by the default.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            commerce_host: env::var("CHECKOUT_COMMERCE_HOST").unwrap_or(defaults.commerce_host),
            funding_url: env::var("CHECKOUT_FUNDING_URL").unwrap_or(defaults.funding_url),
            preferred_connector: env::var("CHECKOUT_PREFERRED_CONNECTOR")
                .ok()
                .or(defaults.preferred_connector),
            poll_interval: parse_env::<u64>("CHECKOUT_POLL_INTERVAL_MS")
                .map_or(defaults.poll_interval, Duration::from_millis),
            broadcast_capacity: parse_env::<usize>("CHECKOUT_BROADCAST_CAPACITY")
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.broadcast_capacity),
            shutdown_timeout: parse_env::<u64>("CHECKOUT_SHUTDOWN_TIMEOUT_MS")
                .map_or(defaults.shutdown_timeout, Duration::from_millis),
        }
    }

    /// Set the funding reference
    #[must_use]
    pub fn with_funding_url(mut self, url: impl Into<String>) -> Self {
        self.funding_url = url.into();
        self
    }

    /// Set the preferred wallet connector
    #[must_use]
    pub fn with_preferred_connector(mut self, connector: impl Into<String>) -> Self {
        self.preferred_connector = Some(connector.into());
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the teardown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Check the values before they reach the orchestrator
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self.commerce_host.trim();
        if host.is_empty() || host.contains("://") || host.contains('/') {
            return Err(ConfigError::InvalidCommerceHost(self.commerce_host.clone()));
        }
        if !self.funding_url.starts_with("https://") {
            return Err(ConfigError::InsecureFundingUrl(self.funding_url.clone()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// Receipt page for `charge_id`
    #[must_use]
    pub fn receipt_url(&self, charge_id: &ChargeId) -> String {
        format!("https://{}/pay/{charge_id}/receipt", self.commerce_host)
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            commerce_host: DEFAULT_COMMERCE_HOST.to_string(),
            funding_url: DEFAULT_FUNDING_URL.to_string(),
            preferred_connector: None,
            poll_interval: Duration::from_secs(1),
            broadcast_capacity: 16,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring malformed configuration value");
            None
        },
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
