//! Logging facade for the DogStatsD intake.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be obtained from configuration files. This requires the
//! `init` feature.
//!
//! ```ignore
//! use intake_log::LogConfig;
//!
//! let log_config = LogConfig {
//!     enable_backtraces: true,
//!     ..LogConfig::default()
//! };
//!
//! intake_log::init(&log_config);
//! ```
//!
//! # Logging
//!
//! The basic use is through the five logging macros: [`error!`], [`warn!`], [`info!`],
//! [`debug!`] and [`trace!`], where `error!` represents the highest-priority log messages and
//! `trace!` the lowest. Each of these macros accepts format strings similarly to [`println!`] as
//! well as structured fields.
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text. Choose the log level according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior, such as data dropped under pressure.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Logging Error Types
//!
//! To log errors together with their causes, pass them as a structured `error` field or wrap them
//! in [`LogError`]:
//!
//! ```
//! use std::io::{Error, ErrorKind};
//! use intake_log::LogError;
//!
//! let custom_error = Error::new(ErrorKind::Other, "oh no!");
//! intake_log::error!(error = &custom_error as &dyn std::error::Error, "operation failed");
//! intake_log::error!("operation failed: {}", LogError(&custom_error));
//! ```
//!
//! ## Sampled Logging
//!
//! Hot paths that can fail for every single packet use a [`Sampler`] so that sustained failures do
//! not flood the log:
//!
//! ```
//! use intake_log::Sampler;
//!
//! static FAILURES: Sampler = Sampler::new(100);
//!
//! if let Some(count) = FAILURES.sample() {
//!     intake_log::warn!(count, "lookup failed");
//! }
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`] that should be called
//! at the beginning of a test. It requires the `test` feature and captures logs of the calling
//! crate only.
//!
//! ```ignore
//! #[test]
//! fn test_something() {
//!     intake_log::init_test!();
//! }
//! ```

#![warn(missing_docs)]

mod config;
pub use config::*;

mod sampler;
pub use sampler::*;

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
