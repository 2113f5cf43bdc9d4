use intake_statsd::MetricsClientConfig;

use crate::Config;

/// Initializes logging from the `logging` section of the config.
pub fn init_logging(config: &Config) {
    intake_log::init(config.logging());
}

/// Initializes internal metrics from the `metrics` section of the config.
///
/// Without a configured statsd address, metrics stay disabled and this is a noop. A failure to
/// set up the client is reported through [`intake_log::ensure_error`] and leaves metrics
/// disabled.
pub fn init_metrics(config: &Config) {
    let Some(host) = config.statsd_addr() else {
        intake_log::debug!("internal metrics disabled, no statsd address configured");
        return;
    };

    let result = intake_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags: config.metrics_default_tags().clone(),
        sample_rate: config.metrics_sample_rate(),
        queue_size: config.metrics_queue_size(),
    });

    if let Err(error) = result {
        intake_log::ensure_error(&error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        let config = Config::from_json_value(serde_json::json!({})).unwrap();
        init_metrics(&config);
        assert!(!intake_statsd::with_client(|_| true));

        let config = Config::from_json_value(serde_json::json!({
            "metrics": {"statsd": "127.0.0.1:8125", "prefix": "test"}
        }))
        .unwrap();
        init_metrics(&config);
        assert!(intake_statsd::with_client(|_| true));

        intake_statsd::disable();
        assert!(!intake_statsd::with_client(|_| true));
    }
}
