//! Configuration for the DogStatsD intake.
//!
//! The configuration is read from a `config.yml` file inside a config folder. All sections are
//! optional and fall back to their defaults:
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: json
//! metrics:
//!   statsd: 127.0.0.1:8125
//!   prefix: intake
//! dogstatsd:
//!   namespace: app.
//!   batch_size: 64
//!   tag_cardinality: orchestrator
//! ```
//!
//! After loading, [`init_logging`] and [`init_metrics`] set up the ambient facilities from the
//! respective sections.

#![warn(missing_docs)]

mod config;
mod setup;

pub use config::*;
pub use setup::*;
