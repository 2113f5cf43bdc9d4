//! Conversion of enriched messages into aggregator records.

use crate::config::DogStatsdConfig;
use crate::parser::{EventMessage, MetricMessage, MetricValue, ServiceCheckMessage};
use crate::sample::{Event, MetricSample, MetricType, SampleValue, ServiceCheck};

/// Maps parsed messages to owned records.
///
/// Tags are taken as they are; all tag rewriting happens in the
/// [`Enricher`](crate::Enricher) beforehand.
#[derive(Clone, Debug, Default)]
pub struct Converter {
    namespace: String,
    namespace_blacklist: Vec<String>,
}

impl Converter {
    /// Creates a converter applying the configured namespace.
    pub fn new(config: &DogStatsdConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            namespace_blacklist: config.namespace_blacklist.clone(),
        }
    }

    /// Returns the final name of a metric.
    ///
    /// The namespace is prepended unless the name starts with a blacklisted prefix.
    pub fn metric_name(&self, name: &str) -> String {
        if self.namespace.is_empty() || self.is_blacklisted(name) {
            return name.to_owned();
        }

        let mut full = String::with_capacity(self.namespace.len() + name.len());
        full.push_str(&self.namespace);
        full.push_str(name);
        full
    }

    fn is_blacklisted(&self, name: &str) -> bool {
        self.namespace_blacklist
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Converts a metric message, calling `emit` once per value.
    pub fn convert_metric<F>(&self, metric: &MetricMessage<'_>, host: &str, mut emit: F)
    where
        F: FnMut(MetricSample),
    {
        let name = self.metric_name(metric.name);
        let tags = metric.tags.to_strings();
        let ty = MetricType::from(metric.kind);

        for value in &metric.values {
            emit(MetricSample {
                host: host.to_owned(),
                name: name.clone(),
                tags: tags.clone(),
                ty,
                value: match *value {
                    MetricValue::Float(value) => SampleValue::Value(value),
                    MetricValue::Raw(raw) => SampleValue::Raw(raw.to_owned()),
                },
                sample_rate: metric.sample_rate,
            });
        }
    }

    /// Converts an event. An `h:` field in the event overrides `host`.
    pub fn convert_event(&self, event: &EventMessage<'_>, host: &str) -> Event {
        Event {
            title: event.title.clone().into_owned(),
            text: event.text.clone().into_owned(),
            timestamp: event.timestamp,
            priority: event.priority,
            alert_type: event.alert_type,
            aggregation_key: event.aggregation_key.map(str::to_owned),
            source_type: event.source_type.map(str::to_owned),
            host: event.hostname.unwrap_or(host).to_owned(),
            tags: event.tags.to_strings(),
        }
    }

    /// Converts a service check. An `h:` field in the check overrides `host`.
    pub fn convert_service_check(&self, check: &ServiceCheckMessage<'_>, host: &str) -> ServiceCheck {
        ServiceCheck {
            name: check.name.to_owned(),
            status: check.status,
            timestamp: check.timestamp,
            host: check.hostname.unwrap_or(host).to_owned(),
            message: check.message.map(str::to_owned),
            tags: check.tags.to_strings(),
        }
    }
}
