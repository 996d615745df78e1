use std::time::Duration;

use config::ConfigError;
use nanoid::nanoid;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Lease timing, batching and retry parameters for one consumer instance.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProcessorConfig {
    /// Identity this instance claims leases under. Must be unique across
    /// concurrently running instances; defaults to a random name per process.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// How long an acquired lease is valid before it expires and becomes
    /// stealable. Bounds failover latency.
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,

    /// Renewal cadence; must stay well under the lease duration so transient
    /// delays don't cause spurious ownership loss.
    #[serde(default = "default_renew_interval_ms")]
    pub renew_interval_ms: u64,

    /// How often the partition set is re-discovered and unowned leases are
    /// tried for acquisition.
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,

    /// Maximum number of change events delivered to the handler at once
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum handler attempts for one batch (first attempt included).
    /// Exhaustion is fatal for the partition.
    #[serde(default = "default_handler_retry_limit")]
    pub handler_retry_limit: usize,

    /// Initial delay between handler retries; doubles per attempt
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,

    /// Initial delay after an empty poll; doubles per empty poll
    #[serde(default = "default_poll_backoff_base_ms")]
    pub poll_backoff_base_ms: u64,

    /// Cap for the empty-poll backoff
    #[serde(default = "default_poll_backoff_max_ms")]
    pub poll_backoff_max_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            lease_duration_ms: default_lease_duration_ms(),
            renew_interval_ms: default_renew_interval_ms(),
            discovery_interval_ms: default_discovery_interval_ms(),
            max_batch_size: default_max_batch_size(),
            handler_retry_limit: default_handler_retry_limit(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            poll_backoff_base_ms: default_poll_backoff_base_ms(),
            poll_backoff_max_ms: default_poll_backoff_max_ms(),
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.instance_name.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "instance_name must not be empty".into(),
            )));
        }

        if self.lease_duration_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "lease_duration_ms must be greater than 0".into(),
            )));
        }

        if self.renew_interval_ms == 0 || self.renew_interval_ms >= self.lease_duration_ms {
            return Err(Error::Config(ConfigError::Message(
                "renew_interval_ms must be non-zero and below lease_duration_ms".into(),
            )));
        }

        if self.discovery_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "discovery_interval_ms must be greater than 0".into(),
            )));
        }

        if self.max_batch_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_batch_size must be greater than 0".into(),
            )));
        }

        if self.handler_retry_limit == 0 {
            return Err(Error::Config(ConfigError::Message(
                "handler_retry_limit must be at least 1".into(),
            )));
        }

        if self.poll_backoff_base_ms == 0 || self.poll_backoff_base_ms > self.poll_backoff_max_ms {
            return Err(Error::Config(ConfigError::Message(
                "poll_backoff_base_ms must be non-zero and at most poll_backoff_max_ms".into(),
            )));
        }

        Ok(())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_millis(self.renew_interval_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms)
    }

    pub fn poll_backoff_base(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_base_ms)
    }

    pub fn poll_backoff_max(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_max_ms)
    }
}

fn default_instance_name() -> String {
    format!("instance-{}", nanoid!(8))
}

fn default_lease_duration_ms() -> u64 {
    60_000
}

// lease_duration / 3
fn default_renew_interval_ms() -> u64 {
    20_000
}

fn default_discovery_interval_ms() -> u64 {
    15_000
}

fn default_max_batch_size() -> usize {
    100
}

fn default_handler_retry_limit() -> usize {
    3
}

fn default_retry_backoff_base_ms() -> u64 {
    200
}

fn default_poll_backoff_base_ms() -> u64 {
    250
}

fn default_poll_backoff_max_ms() -> u64 {
    5_000
}
