use bytes::Bytes;

use super::ParseErrorKind;
use crate::pool::Pooled;
use crate::protocol::ServiceCheckStatus;
use crate::tags::TagSet;

/// A parsed service check line.
#[derive(Debug)]
pub struct ServiceCheckMessage<'a> {
    /// The check name, never empty.
    pub name: &'a str,
    /// The reported status.
    pub status: ServiceCheckStatus,
    /// Value of the `d:` field, or `0` if absent.
    pub timestamp: i64,
    /// Value of the `h:` field, overriding the resolved hostname.
    pub hostname: Option<&'a str>,
    /// Value of the `m:` field.
    pub message: Option<&'a str>,
    /// Tags from the `#` field.
    pub tags: Pooled<TagSet>,
    /// Value of the `c:` field.
    pub container_id: Option<&'a str>,
}

pub(super) fn parse<'a>(
    line: &'a str,
    packet: &Bytes,
    tags: Pooled<TagSet>,
) -> Result<ServiceCheckMessage<'a>, ParseErrorKind> {
    let mut fields = line
        .strip_prefix("_sc|")
        .ok_or(ParseErrorKind::InvalidHeader)?
        .split('|');

    let name = match fields.next() {
        None | Some("") => return Err(ParseErrorKind::MissingName),
        Some(name) => name,
    };

    let status = match fields.next() {
        None | Some("") => return Err(ParseErrorKind::MissingStatus),
        Some(status) => status
            .parse()
            .ok()
            .and_then(ServiceCheckStatus::from_code)
            .ok_or(ParseErrorKind::InvalidStatus)?,
    };

    let mut check = ServiceCheckMessage {
        name,
        status,
        timestamp: 0,
        hostname: None,
        message: None,
        tags,
        container_id: None,
    };

    for field in fields {
        if let Some(field) = field.strip_prefix('#') {
            check.tags.clear();
            check.tags.extend_from_field(packet, field);
            continue;
        }

        match field.split_once(':') {
            Some(("d", value)) => {
                if let Ok(timestamp) = value.parse() {
                    check.timestamp = timestamp;
                }
            }
            Some(("h", value)) => check.hostname = Some(value),
            Some(("m", value)) => check.message = Some(value),
            Some(("c", value)) => check.container_id = Some(value),
            _ => (),
        }
    }

    Ok(check)
}
