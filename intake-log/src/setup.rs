use std::env;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::{LogConfig, LogFormat};

// Import CRATE_NAMES, which lists all crates in the workspace.
include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

/// Returns the default filter directives.
///
/// Third-party crates log at `INFO`, all crates of this workspace at `TRACE`. The effective level
/// is then capped by [`LogConfig::level`].
fn default_filters() -> EnvFilter {
    let mut env_filter = EnvFilter::new("INFO");

    for name in CRATE_NAMES {
        if let Ok(directive) = format!("{name}=TRACE").parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    env_filter
}

/// Initialize the logging system.
///
/// Filters can be overridden with the `RUST_LOG` environment variable. Calling this function more
/// than once has no effect.
///
/// # Example
///
/// ```
/// let log_config = intake_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// intake_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        env::set_var("RUST_BACKTRACE", "full");
    }
    let backtraces = crate::backtrace_enabled();

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => fmt::layer()
            .compact()
            .without_time()
            .with_ansi(true)
            .boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            fmt::layer().with_ansi(false).boxed()
        }
        (LogFormat::Json, _) => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    let env_filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => EnvFilter::new(value),
        Err(_) => default_filters(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(config.level.level_filter()))
        .with(env_filter)
        .try_init()
        .ok();

    tracing::debug!(backtraces, "logging initialized");
}
