//! Parser for the DogStatsD line protocol.
//!
//! A packet holds one or more messages separated by newlines. Each message is a metric sample,
//! an event (`_e{...}`) or a service check (`_sc|...`):
//!
//! ```text
//! <name>:<value>[:<value>...]|<type>[|@<rate>][|#<tag>,<tag>...][|c:<container-id>]
//! _e{<title_len>,<text_len>}:<title>|<text>[|d:<ts>][|h:<host>][|p:<prio>][|t:<alert>][|#<tags>][|k:<key>][|s:<source>]
//! _sc|<name>|<status>[|d:<ts>][|h:<host>][|#<tags>][|m:<message>]
//! ```
//!
//! Parsed messages borrow their string fields from the packet. Tags are stored as reference
//! counted slices of the packet in a pooled [`TagSet`].

use std::iter::FusedIterator;

use bytes::Bytes;

use crate::pool::{Pool, Pooled};
use crate::protocol::MessageType;
use crate::tags::TagSet;

mod event;
mod metric;
mod service_check;

pub use self::event::EventMessage;
pub use self::metric::{MetricMessage, MetricValue};
pub use self::service_check::ServiceCheckMessage;

/// The reason a message failed to parse.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    /// The message is not valid UTF-8.
    #[error("message is not valid UTF-8")]
    InvalidUtf8,
    /// The metric or service check name is empty.
    #[error("missing name")]
    MissingName,
    /// The metric has no value.
    #[error("missing value")]
    MissingValue,
    /// A metric value is not a finite number.
    #[error("invalid value")]
    InvalidValue,
    /// The metric has no type.
    #[error("missing metric type")]
    MissingType,
    /// The metric type is unknown.
    #[error("invalid metric type")]
    InvalidType,
    /// The sample rate is not a positive number.
    #[error("invalid sample rate")]
    InvalidSampleRate,
    /// The event header `_e{<title_len>,<text_len>}:` is malformed.
    #[error("invalid event header")]
    InvalidHeader,
    /// The declared event title or text length does not match the payload.
    #[error("title or text length does not match the payload")]
    LengthMismatch,
    /// The event title or text is empty.
    #[error("empty title or text")]
    EmptyTitleOrText,
    /// The service check has no status.
    #[error("missing status")]
    MissingStatus,
    /// The service check status is not one of `0`, `1`, `2`, `3`.
    #[error("invalid status")]
    InvalidStatus,
}

/// An error returned for a single malformed message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("failed to parse {ty}: {kind}")]
pub struct ParseError {
    /// The detected type of the rejected message.
    pub ty: MessageType,
    /// The reason for the rejection.
    pub kind: ParseErrorKind,
}

/// A successfully parsed message.
#[derive(Debug)]
pub enum Message<'a> {
    /// One or more metric samples sharing name, type, and tags.
    Metric(MetricMessage<'a>),
    /// An event.
    Event(EventMessage<'a>),
    /// A service check.
    ServiceCheck(ServiceCheckMessage<'a>),
}

impl Message<'_> {
    /// Returns the type of this message.
    pub fn ty(&self) -> MessageType {
        match self {
            Self::Metric(_) => MessageType::Metric,
            Self::Event(_) => MessageType::Event,
            Self::ServiceCheck(_) => MessageType::ServiceCheck,
        }
    }
}

/// Parses packets into messages, drawing tag containers from a shared pool.
#[derive(Clone, Debug)]
pub struct Parser {
    tags: Pool<TagSet>,
}

impl Parser {
    /// Creates a parser taking tag containers from `tags`.
    pub fn new(tags: Pool<TagSet>) -> Self {
        Self { tags }
    }

    /// Parses all messages in a packet.
    ///
    /// Returns a result for each non-empty line. Both `\n` and `\r\n` line endings are accepted.
    /// An error for one message does not affect the remaining messages, so the iterator can be
    /// consumed past errors. Events without a `d:` field are stamped with `timestamp`.
    ///
    /// # Example
    ///
    /// ```
    /// use bytes::Bytes;
    /// use intake_dogstatsd::{tag_pool, Message, Parser};
    ///
    /// let parser = Parser::new(tag_pool(16));
    /// let packet = Bytes::from_static(b"page.views:1|c|#env:prod\n_sc|app.up|0");
    ///
    /// for result in parser.parse_packet(&packet, 1_700_000_000) {
    ///     match result.expect("message should parse") {
    ///         Message::Metric(metric) => assert_eq!(metric.name, "page.views"),
    ///         Message::ServiceCheck(check) => assert_eq!(check.name, "app.up"),
    ///         Message::Event(_) => unreachable!(),
    ///     }
    /// }
    /// ```
    pub fn parse_packet<'a>(&'a self, packet: &'a Bytes, timestamp: i64) -> ParseMessages<'a> {
        ParseMessages {
            parser: self,
            packet,
            rest: packet.as_ref(),
            timestamp,
        }
    }

    /// Parses one line, which must be a subslice of `packet`.
    fn parse_line<'a>(
        &self,
        packet: &'a Bytes,
        line: &'a [u8],
        timestamp: i64,
    ) -> Result<Message<'a>, ParseError> {
        let ty = MessageType::detect(line);
        let error = |kind| ParseError { ty, kind };

        let line = std::str::from_utf8(line).map_err(|_| error(ParseErrorKind::InvalidUtf8))?;
        let tags: Pooled<TagSet> = self.tags.get();

        let result = match ty {
            MessageType::Metric => metric::parse(line, packet, tags).map(Message::Metric),
            MessageType::Event => event::parse(line, packet, tags, timestamp).map(Message::Event),
            MessageType::ServiceCheck => {
                service_check::parse(line, packet, tags).map(Message::ServiceCheck)
            }
        };

        result.map_err(error)
    }
}

/// Iterator over the messages of a packet, returned by [`Parser::parse_packet`].
#[derive(Clone, Debug)]
pub struct ParseMessages<'a> {
    parser: &'a Parser,
    packet: &'a Bytes,
    rest: &'a [u8],
    timestamp: i64,
}

impl<'a> Iterator for ParseMessages<'a> {
    type Item = Result<Message<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rest.is_empty() {
                return None;
            }

            let line = match memchr::memchr(b'\n', self.rest) {
                Some(index) => {
                    let line = &self.rest[..index];
                    self.rest = &self.rest[index + 1..];
                    line
                }
                None => std::mem::take(&mut self.rest),
            };

            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if !line.is_empty() {
                return Some(self.parser.parse_line(self.packet, line, self.timestamp));
            }
        }
    }
}

impl FusedIterator for ParseMessages<'_> {}
