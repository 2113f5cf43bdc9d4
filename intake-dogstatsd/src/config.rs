use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tagger::TagCardinality;

/// An invalid value in [`DogStatsdConfig`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum InvalidConfig {
    /// The batch size is zero.
    #[error("batch size must be greater than zero")]
    BatchSize,
    /// The number of workers is zero.
    #[error("number of workers must be greater than zero")]
    Workers,
}

/// Configuration of the DogStatsD pipeline.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DogStatsdConfig {
    /// Hostname attached to records that do not carry a `host:` tag.
    ///
    /// Defaults to the hostname of the machine.
    pub hostname: String,

    /// Prefix prepended to all metric names, for example `"app."`.
    pub namespace: String,

    /// Metric name prefixes that are never namespaced.
    pub namespace_blacklist: Vec<String>,

    /// Maximum number of samples in a batch handed to the aggregator.
    pub batch_size: usize,

    /// When an entity id tag is present, skip the tags of the packet origin.
    pub entity_id_precedence: bool,

    /// Cardinality of tags resolved for origins and entity ids.
    pub tag_cardinality: TagCardinality,

    /// Number of worker threads.
    pub workers: usize,

    /// Maximum number of packet groups queued for the workers.
    pub queue_size: usize,

    /// Maximum number of idle objects kept in each pool.
    pub pool_size: usize,

    /// Seconds the workers may spend draining queued packets on shutdown.
    pub shutdown_timeout: u64,
}

impl DogStatsdConfig {
    /// Checks the configuration for values that prevent the pipeline from starting.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.batch_size == 0 {
            return Err(InvalidConfig::BatchSize);
        }
        if self.workers == 0 {
            return Err(InvalidConfig::Workers);
        }
        Ok(())
    }

    /// Returns the shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

impl Default for DogStatsdConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            namespace: String::new(),
            namespace_blacklist: Vec::new(),
            batch_size: 32,
            entity_id_precedence: false,
            tag_cardinality: TagCardinality::default(),
            workers: num_cpus::get().max(2) / 2,
            queue_size: 1024,
            pool_size: 1024,
            shutdown_timeout: 10,
        }
    }
}

fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
}
