//! Records handed to the aggregator.
//!
//! These records own all their data and are independent of the packet they were parsed from.

use serde::Serialize;

use crate::protocol::{AlertType, EventPriority, MetricKind, ServiceCheckStatus};

/// The metric type as understood by the aggregator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Last value wins.
    Gauge,
    /// Values are summed.
    Counter,
    /// Values are summarized into percentiles on the agent.
    Histogram,
    /// Values are sent to the backend for global percentiles.
    Distribution,
    /// Unique values are counted.
    Set,
}

impl From<MetricKind> for MetricType {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Gauge => Self::Gauge,
            MetricKind::Counter => Self::Counter,
            MetricKind::Histogram | MetricKind::Timing => Self::Histogram,
            MetricKind::Distribution => Self::Distribution,
            MetricKind::Set => Self::Set,
        }
    }
}

/// The value of a [`MetricSample`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleValue {
    /// A numeric value, for all types except sets.
    Value(f64),
    /// The raw value of a set.
    Raw(String),
}

/// A single metric sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricSample {
    /// The resolved hostname.
    pub host: String,
    /// The metric name, including the namespace.
    pub name: String,
    /// The final tags.
    pub tags: Vec<String>,
    /// The aggregation type.
    #[serde(rename = "type")]
    pub ty: MetricType,
    /// The value.
    pub value: SampleValue,
    /// The client-side sample rate.
    pub sample_rate: f64,
}

/// An event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    /// The unescaped title.
    pub title: String,
    /// The unescaped text body.
    pub text: String,
    /// Unix timestamp in seconds, defaulting to the time the packet was processed.
    pub timestamp: i64,
    /// The event priority.
    pub priority: EventPriority,
    /// The alert type.
    pub alert_type: AlertType,
    /// Key grouping related events.
    pub aggregation_key: Option<String>,
    /// Name of the integration that sent the event.
    pub source_type: Option<String>,
    /// The resolved hostname.
    pub host: String,
    /// The final tags.
    pub tags: Vec<String>,
}

/// A service check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceCheck {
    /// Name of the check.
    pub name: String,
    /// The reported status.
    pub status: ServiceCheckStatus,
    /// Unix timestamp in seconds, `0` if the check carried none.
    pub timestamp: i64,
    /// The resolved hostname.
    pub host: String,
    /// Message describing the status.
    pub message: Option<String>,
    /// The final tags.
    pub tags: Vec<String>,
}
