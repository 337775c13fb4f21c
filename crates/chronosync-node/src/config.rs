//! Node configuration

use chronosync_core::Name;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default lower bound of the uniform publish delay (ms)
pub const DEFAULT_MIN_DELAY_MS: u64 = 500;
/// Default upper bound of the uniform publish delay (ms)
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid delay range: min {min_ms}ms > max {max_ms}ms")]
    InvalidDelayRange { min_ms: u64, max_ms: u64 },
    #[error("Invalid publication rate: {0}")]
    InvalidRate(f64),
    #[error("Publication rate {0}/s yields a zero delay")]
    ZeroDelay(f64),
}

/// Inter-publication delay distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishDelay {
    /// Uniform integer milliseconds over `[min_ms, max_ms]`
    UniformMs { min_ms: u64, max_ms: u64 },
    /// Fixed `1000 / per_second` milliseconds between publications
    Rate { per_second: f64 },
}

impl PublishDelay {
    /// Validate the distribution parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            PublishDelay::UniformMs { min_ms, max_ms } => {
                if min_ms > max_ms {
                    return Err(ConfigError::InvalidDelayRange { min_ms, max_ms });
                }
            }
            PublishDelay::Rate { per_second } => {
                rate_interval(per_second)?;
            }
        }
        Ok(())
    }
}

impl Default for PublishDelay {
    fn default() -> Self {
        PublishDelay::UniformMs {
            min_ms: DEFAULT_MIN_DELAY_MS,
            max_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// Interval between publications for a rate-based cadence
pub(crate) fn rate_interval(per_second: f64) -> Result<Duration, ConfigError> {
    if !per_second.is_finite() || per_second <= 0.0 {
        return Err(ConfigError::InvalidRate(per_second));
    }
    let interval = Duration::try_from_secs_f64(1.0 / per_second)
        .map_err(|_| ConfigError::InvalidRate(per_second))?;
    if interval.is_zero() {
        return Err(ConfigError::ZeroDelay(per_second));
    }
    Ok(interval)
}

/// Per-node configuration, fixed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Group the node synchronizes in
    pub sync_prefix: Name,
    /// Node's own namespace; also the identity in published payloads
    pub user_prefix: Name,
    /// Prefix prepended to the user prefix to make it routable
    pub routing_prefix: Name,
    /// Seed for the publish delay generator
    pub seed: u32,
    /// Inter-publication delay distribution
    #[serde(default)]
    pub publish_delay: PublishDelay,
}

impl NodeConfig {
    /// Configuration with root sync/routing prefixes, seed 0, default delays
    pub fn new(user_prefix: impl Into<Name>) -> Self {
        Self {
            sync_prefix: Name::root(),
            user_prefix: user_prefix.into(),
            routing_prefix: Name::root(),
            seed: 0,
            publish_delay: PublishDelay::default(),
        }
    }

    pub fn with_sync_prefix(mut self, prefix: impl Into<Name>) -> Self {
        self.sync_prefix = prefix.into();
        self
    }

    pub fn with_routing_prefix(mut self, prefix: impl Into<Name>) -> Self {
        self.routing_prefix = prefix.into();
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_publish_delay(mut self, delay: PublishDelay) -> Self {
        self.publish_delay = delay;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.publish_delay.validate()
    }

    /// Routing prefix followed by the user prefix
    pub fn routable_prefix(&self) -> Name {
        self.routing_prefix.join(&self.user_prefix)
    }
}
