use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::parser::ParseErrorKind;

/// The kind of a DogStatsD message, detected from its prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MessageType {
    /// A metric sample, the default when no other prefix matches.
    Metric,
    /// An event, prefixed with `_e{`.
    Event,
    /// A service check, prefixed with `_sc|`.
    ServiceCheck,
}

impl MessageType {
    /// Detects the message type from the start of a line.
    pub fn detect(line: &[u8]) -> Self {
        if line.starts_with(b"_e{") {
            Self::Event
        } else if line.starts_with(b"_sc|") {
            Self::ServiceCheck
        } else {
            Self::Metric
        }
    }

    /// Returns the name used in logs and telemetry tags.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metric => "metrics",
            Self::Event => "events",
            Self::ServiceCheck => "service_checks",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The metric type as it appears on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MetricKind {
    /// `g`
    Gauge,
    /// `c`
    Counter,
    /// `h`
    Histogram,
    /// `ms`
    Timing,
    /// `d`
    Distribution,
    /// `s`
    Set,
}

impl MetricKind {
    /// Returns the wire shortcode of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "g",
            Self::Counter => "c",
            Self::Histogram => "h",
            Self::Timing => "ms",
            Self::Distribution => "d",
            Self::Set => "s",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ParseErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "g" => Self::Gauge,
            "c" => Self::Counter,
            "h" => Self::Histogram,
            "ms" => Self::Timing,
            "d" => Self::Distribution,
            "s" => Self::Set,
            _ => return Err(ParseErrorKind::InvalidType),
        })
    }
}

/// Priority of an event.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    /// The default priority.
    #[default]
    Normal,
    /// Low priority.
    Low,
}

impl EventPriority {
    /// Parses the value of a `p:` field. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Alert type of an event.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    /// `t:error`
    Error,
    /// `t:warning`
    Warning,
    /// `t:info`, the default.
    #[default]
    Info,
    /// `t:success`
    Success,
}

impl AlertType {
    /// Parses the value of a `t:` field. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "info" => Some(Self::Info),
            "success" => Some(Self::Success),
            _ => None,
        }
    }
}

/// Status reported by a service check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCheckStatus {
    /// `0`
    Ok,
    /// `1`
    Warning,
    /// `2`
    Critical,
    /// `3`
    Unknown,
}

impl ServiceCheckStatus {
    /// Maps a numeric wire status to the status. Only `0..=3` are valid.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Warning),
            2 => Some(Self::Critical),
            3 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Returns the numeric wire status.
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_message_type() {
        assert_eq!(MessageType::detect(b"_e{1,1}:a|b"), MessageType::Event);
        assert_eq!(MessageType::detect(b"_sc|check|0"), MessageType::ServiceCheck);
        assert_eq!(MessageType::detect(b"_sc"), MessageType::Metric);
        assert_eq!(MessageType::detect(b"_e:1|c"), MessageType::Metric);
        assert_eq!(MessageType::detect(b""), MessageType::Metric);
    }

    #[test]
    fn test_metric_kind_from_str() {
        let kinds: Vec<_> = ["g", "c", "h", "ms", "d", "s"]
            .iter()
            .map(|s| s.parse::<MetricKind>().unwrap())
            .collect();

        assert_eq!(
            kinds,
            [
                MetricKind::Gauge,
                MetricKind::Counter,
                MetricKind::Histogram,
                MetricKind::Timing,
                MetricKind::Distribution,
                MetricKind::Set,
            ]
        );
        assert_eq!("x".parse::<MetricKind>(), Err(ParseErrorKind::InvalidType));
        assert_eq!("G".parse::<MetricKind>(), Err(ParseErrorKind::InvalidType));
    }

    #[test]
    fn test_service_check_status_codes() {
        for code in 0..=3 {
            assert_eq!(ServiceCheckStatus::from_code(code).unwrap().code(), code);
        }
        assert_eq!(ServiceCheckStatus::from_code(4), None);
    }
}
