use std::borrow::Cow;

use bytes::Bytes;

use super::ParseErrorKind;
use crate::pool::Pooled;
use crate::protocol::{AlertType, EventPriority};
use crate::tags::TagSet;

/// A parsed event line.
#[derive(Debug)]
pub struct EventMessage<'a> {
    /// The title, with `\n` escapes replaced by newlines.
    pub title: Cow<'a, str>,
    /// The text, with `\n` escapes replaced by newlines.
    pub text: Cow<'a, str>,
    /// UNIX timestamp in seconds, defaulting to the receipt time.
    pub timestamp: i64,
    /// Value of the `p:` field.
    pub priority: EventPriority,
    /// Value of the `t:` field.
    pub alert_type: AlertType,
    /// Value of the `k:` field.
    pub aggregation_key: Option<&'a str>,
    /// Value of the `s:` field.
    pub source_type: Option<&'a str>,
    /// Value of the `h:` field, overriding the resolved hostname.
    pub hostname: Option<&'a str>,
    /// Tags from the `#` field.
    pub tags: Pooled<TagSet>,
    /// Value of the `c:` field.
    pub container_id: Option<&'a str>,
}

pub(super) fn parse<'a>(
    line: &'a str,
    packet: &Bytes,
    tags: Pooled<TagSet>,
    timestamp: i64,
) -> Result<EventMessage<'a>, ParseErrorKind> {
    let (title_len, text_len, rest) = parse_header(line)?;

    // The lengths are byte counts, and slicing must land on char boundaries.
    let title = rest.get(..title_len).ok_or(ParseErrorKind::LengthMismatch)?;
    if rest.as_bytes().get(title_len) != Some(&b'|') {
        return Err(ParseErrorKind::LengthMismatch);
    }

    let text_start = title_len + 1;
    let text_end = text_start
        .checked_add(text_len)
        .ok_or(ParseErrorKind::LengthMismatch)?;
    let text = rest
        .get(text_start..text_end)
        .ok_or(ParseErrorKind::LengthMismatch)?;

    if title.is_empty() || text.is_empty() {
        return Err(ParseErrorKind::EmptyTitleOrText);
    }

    let metadata = match &rest[text_end..] {
        "" => None,
        trailing => Some(
            trailing
                .strip_prefix('|')
                .ok_or(ParseErrorKind::LengthMismatch)?,
        ),
    };

    let mut event = EventMessage {
        title: unescape(title),
        text: unescape(text),
        timestamp,
        priority: EventPriority::default(),
        alert_type: AlertType::default(),
        aggregation_key: None,
        source_type: None,
        hostname: None,
        tags,
        container_id: None,
    };

    for field in metadata.into_iter().flat_map(|m| m.split('|')) {
        if let Some(field) = field.strip_prefix('#') {
            event.tags.clear();
            event.tags.extend_from_field(packet, field);
            continue;
        }

        match field.split_once(':') {
            Some(("d", value)) => {
                if let Ok(timestamp) = value.parse() {
                    event.timestamp = timestamp;
                }
            }
            Some(("h", value)) => event.hostname = Some(value),
            Some(("p", value)) => {
                if let Some(priority) = EventPriority::parse(value) {
                    event.priority = priority;
                }
            }
            Some(("t", value)) => {
                if let Some(alert_type) = AlertType::parse(value) {
                    event.alert_type = alert_type;
                }
            }
            Some(("k", value)) => event.aggregation_key = Some(value),
            Some(("s", value)) => event.source_type = Some(value),
            Some(("c", value)) => event.container_id = Some(value),
            _ => (),
        }
    }

    Ok(event)
}

/// Parses `_e{<title_len>,<text_len>}:` and returns both lengths and the remainder.
fn parse_header(line: &str) -> Result<(usize, usize, &str), ParseErrorKind> {
    let (lengths, rest) = line
        .strip_prefix("_e{")
        .and_then(|line| line.split_once("}:"))
        .ok_or(ParseErrorKind::InvalidHeader)?;

    let (title_len, text_len) = lengths
        .split_once(',')
        .ok_or(ParseErrorKind::InvalidHeader)?;

    let title_len = title_len
        .parse()
        .map_err(|_| ParseErrorKind::InvalidHeader)?;
    let text_len = text_len
        .parse()
        .map_err(|_| ParseErrorKind::InvalidHeader)?;

    Ok((title_len, text_len, rest))
}

fn unescape(s: &str) -> Cow<'_, str> {
    if s.contains("\\n") {
        Cow::Owned(s.replace("\\n", "\n"))
    } else {
        Cow::Borrowed(s)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::tags::tag_pool;

    const RECEIVED_AT: i64 = 1_700_000_000;

    fn parse_event(line: &'static str) -> Result<EventMessage<'static>, ParseErrorKind> {
        let packet = Bytes::from_static(line.as_bytes());
        parse(line, &packet, tag_pool(1).get(), RECEIVED_AT)
    }

    #[test]
    fn test_parse_event_with_metadata() {
        let event = parse_event("_e{5,4}:title|text|d:21|h:localhost|p:low|t:warning").unwrap();

        assert_eq!(event.title, "title");
        assert_eq!(event.text, "text");
        assert_eq!(event.timestamp, 21);
        assert_eq!(event.hostname, Some("localhost"));
        assert_eq!(event.priority, EventPriority::Low);
        assert_eq!(event.alert_type, AlertType::Warning);
        assert!(event.tags.is_empty());
    }

    #[test]
    fn test_parse_event_defaults() {
        let event = parse_event("_e{10,9}:test title|test text").unwrap();

        assert_eq!(event.title, "test title");
        assert_eq!(event.text, "test text");
        assert_eq!(event.timestamp, RECEIVED_AT);
        assert_eq!(event.priority, EventPriority::Normal);
        assert_eq!(event.alert_type, AlertType::Info);
        assert_eq!(event.hostname, None);
        assert_eq!(event.aggregation_key, None);
        assert_eq!(event.source_type, None);
        assert_eq!(event.container_id, None);
    }

    #[test]
    fn test_parse_event_all_fields() {
        let event = parse_event(
            "_e{5,4}:title|text|k:deploy|s:jenkins|#env:prod,team|c:abc|p:normal|t:success",
        )
        .unwrap();

        assert_eq!(event.aggregation_key, Some("deploy"));
        assert_eq!(event.source_type, Some("jenkins"));
        assert_eq!(event.tags.to_strings(), ["env:prod", "team"]);
        assert_eq!(event.container_id, Some("abc"));
        assert_eq!(event.priority, EventPriority::Normal);
        assert_eq!(event.alert_type, AlertType::Success);
    }

    #[test]
    fn test_text_containing_pipes() {
        let event = parse_event("_e{5,8}:title|a|b|c|de|p:low").unwrap();
        assert_eq!(event.text, "a|b|c|de");
        assert_eq!(event.priority, EventPriority::Low);
    }

    #[test]
    fn test_unescape_newlines() {
        let event = parse_event("_e{7,10}:ti\\ntle|first\\nsec").unwrap();
        assert_eq!(event.title, "ti\ntle");
        assert_eq!(event.text, "first\nsec");
    }

    #[test]
    fn test_multibyte_lengths_are_bytes() {
        let event = parse_event("_e{6,2}:titlé|ok").unwrap();
        assert_eq!(event.title, "titlé");

        // The declared title length splits `é`.
        assert_eq!(
            parse_event("_e{5,2}:titlé|ok").unwrap_err(),
            ParseErrorKind::LengthMismatch
        );
    }

    #[test]
    fn test_unknown_and_invalid_metadata_ignored() {
        let event = parse_event("_e{1,1}:a|b|d:yesterday|p:urgent|t:fatal|z:1|junk").unwrap();
        assert_eq!(event.timestamp, RECEIVED_AT);
        assert_eq!(event.priority, EventPriority::Normal);
        assert_eq!(event.alert_type, AlertType::Info);
    }

    #[test]
    fn test_malformed_events() {
        let cases = [
            ("_e{5,4}title|text", ParseErrorKind::InvalidHeader),
            ("_e{5}:title|text", ParseErrorKind::InvalidHeader),
            ("_e{a,4}:title|text", ParseErrorKind::InvalidHeader),
            ("_e{5,-4}:title|text", ParseErrorKind::InvalidHeader),
            ("_e{6,4}:title|text", ParseErrorKind::LengthMismatch),
            ("_e{4,4}:title|text", ParseErrorKind::LengthMismatch),
            ("_e{5,5}:title|text", ParseErrorKind::LengthMismatch),
            ("_e{5,3}:title|text", ParseErrorKind::LengthMismatch),
            ("_e{5,4}:title", ParseErrorKind::LengthMismatch),
            (
                "_e{5,18446744073709551615}:title|text",
                ParseErrorKind::LengthMismatch,
            ),
            ("_e{0,4}:|text", ParseErrorKind::EmptyTitleOrText),
            ("_e{5,0}:title|", ParseErrorKind::EmptyTitleOrText),
        ];

        for (line, kind) in cases {
            assert_eq!(parse_event(line).unwrap_err(), kind, "{line}");
        }
    }
}
