use bytes::Bytes;
use smallvec::{smallvec, SmallVec};

use super::ParseErrorKind;
use crate::pool::Pooled;
use crate::protocol::MetricKind;
use crate::tags::TagSet;

/// A single value of a metric message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue<'a> {
    /// A finite numeric value.
    Float(f64),
    /// The unparsed value of a set.
    Raw(&'a str),
}

/// A parsed metric line.
///
/// A line may carry several values separated by `:`, each producing an independent sample with
/// the same name, type, rate and tags. Set values are never split.
#[derive(Debug)]
pub struct MetricMessage<'a> {
    /// The metric name, never empty.
    pub name: &'a str,
    /// One or more values.
    pub values: SmallVec<[MetricValue<'a>; 2]>,
    /// The wire metric type.
    pub kind: MetricKind,
    /// The client-side sample rate in `(0, 1]`.
    pub sample_rate: f64,
    /// Tags from the `#` field.
    pub tags: Pooled<TagSet>,
    /// Value of the `c:` field.
    pub container_id: Option<&'a str>,
}

pub(super) fn parse<'a>(
    line: &'a str,
    packet: &Bytes,
    mut tags: Pooled<TagSet>,
) -> Result<MetricMessage<'a>, ParseErrorKind> {
    let mut fields = line.split('|');

    let (name, raw_values) = fields
        .next()
        .and_then(|head| head.split_once(':'))
        .ok_or(ParseErrorKind::MissingValue)?;

    if name.is_empty() {
        return Err(ParseErrorKind::MissingName);
    }

    let kind = match fields.next() {
        None | Some("") => return Err(ParseErrorKind::MissingType),
        Some(kind) => kind.parse()?,
    };

    let values = parse_values(raw_values, kind)?;

    let mut sample_rate = 1.0;
    let mut container_id = None;

    for field in fields {
        if let Some(rate) = field.strip_prefix('@') {
            sample_rate = parse_sample_rate(rate)?;
        } else if let Some(field) = field.strip_prefix('#') {
            tags.clear();
            tags.extend_from_field(packet, field);
        } else if let Some(id) = field.strip_prefix("c:") {
            container_id = Some(id);
        }
    }

    Ok(MetricMessage {
        name,
        values,
        kind,
        sample_rate,
        tags,
        container_id,
    })
}

fn parse_values(
    raw: &str,
    kind: MetricKind,
) -> Result<SmallVec<[MetricValue<'_>; 2]>, ParseErrorKind> {
    if raw.is_empty() {
        return Err(ParseErrorKind::MissingValue);
    }

    if kind == MetricKind::Set {
        return Ok(smallvec![MetricValue::Raw(raw)]);
    }

    raw.split(':')
        .map(|value| match value.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(MetricValue::Float(value)),
            _ => Err(ParseErrorKind::InvalidValue),
        })
        .collect()
}

/// Parses the `@` field. Rates above `1` are clamped.
fn parse_sample_rate(s: &str) -> Result<f64, ParseErrorKind> {
    let rate: f64 = s.parse().map_err(|_| ParseErrorKind::InvalidSampleRate)?;
    if rate.is_nan() || rate <= 0.0 {
        return Err(ParseErrorKind::InvalidSampleRate);
    }
    Ok(rate.min(1.0))
}
