//! The DogStatsD ingestion pipeline.
//!
//! Packets received by a listener pass through four stages before they reach the aggregator:
//!
//! 1. The [`Parser`] splits a packet into lines and decodes each line into a metric, event or
//!    service check. Malformed lines yield a [`ParseError`] without affecting their neighbors.
//! 2. The [`Enricher`] resolves the hostname from `host:` tags and adds tags of the packet
//!    origin and of `dd.internal.entity_id` entities from the [`TagResolver`].
//! 3. The [`Converter`] applies the metric namespace and produces owned records.
//! 4. The [`Batcher`] collects the records and sends them to the [`Outputs`].
//!
//! A [`Processor`] runs these stages for one worker, and the [`Server`] runs a processor on each
//! of its worker threads.
//!
//! Tag containers and sample buffers are drawn from shared [`Pool`]s, so that steady-state
//! processing does not allocate them per packet.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use intake_dogstatsd::{DogStatsdConfig, NoopResolver, Outputs, Packet, Server};
//!
//! let config = DogStatsdConfig {
//!     hostname: "web-1".to_owned(),
//!     workers: 1,
//!     ..Default::default()
//! };
//!
//! let (outputs, receivers) = Outputs::bounded(16);
//! let server = Server::start(&config, Arc::new(NoopResolver), outputs).unwrap();
//!
//! server
//!     .sender()
//!     .send(vec![Packet::new("page.views:1|c|#env:prod")])
//!     .unwrap();
//!
//! let batch = receivers.samples.recv().unwrap();
//! assert_eq!(batch[0].name, "page.views");
//! assert_eq!(batch[0].host, "web-1");
//!
//! server.stop();
//! ```

#![warn(missing_docs)]

mod batch;
mod config;
mod convert;
mod enrich;
mod parser;
mod pool;
mod processor;
mod protocol;
mod sample;
mod server;
mod statsd;
mod tagger;
mod tags;

pub use self::batch::*;
pub use self::config::*;
pub use self::convert::*;
pub use self::enrich::*;
pub use self::parser::*;
pub use self::pool::*;
pub use self::processor::*;
pub use self::protocol::*;
pub use self::sample::*;
pub use self::server::*;
pub use self::tagger::*;
pub use self::tags::*;
