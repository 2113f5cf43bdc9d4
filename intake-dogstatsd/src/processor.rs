//! Per-worker processing of packets from parsing to batching.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::Receiver;
use intake_log::{LogError, Sampler};
use intake_statsd::metric;

use crate::batch::{Batcher, Outputs};
use crate::config::{DogStatsdConfig, InvalidConfig};
use crate::convert::Converter;
use crate::enrich::Enricher;
use crate::parser::{Message, ParseError, Parser};
use crate::pool::Pool;
use crate::sample::MetricSample;
use crate::statsd::{DogStatsdCounters, DogStatsdTimers};
use crate::tagger::TagResolver;
use crate::tags::TagSet;

static PARSE_FAILURES: Sampler = Sampler::new(1000);

/// A datagram received by a listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// The raw payload with one or more messages.
    pub contents: Bytes,
    /// The entity that sent the packet, if known, for example `container_id://<id>`.
    pub origin: Option<String>,
}

impl Packet {
    /// Creates a packet without an origin.
    pub fn new(contents: impl Into<Bytes>) -> Self {
        Self {
            contents: contents.into(),
            origin: None,
        }
    }

    /// Sets the origin of the packet.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Number of messages handled by [`Processor::process_packets`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProcessReport {
    /// Metric messages, each possibly producing multiple samples.
    pub metrics: usize,
    /// Events.
    pub events: usize,
    /// Service checks.
    pub service_checks: usize,
    /// Messages rejected by the parser.
    pub errors: usize,
}

/// Runs packets through parsing, enrichment, conversion and batching.
///
/// A processor belongs to a single worker. It shares only its pools and outputs with other
/// workers.
#[derive(Debug)]
pub struct Processor {
    parser: Parser,
    enricher: Enricher,
    converter: Converter,
    batcher: Batcher,
}

impl Processor {
    /// Creates a processor drawing buffers from the given pools.
    pub fn new(
        config: &DogStatsdConfig,
        resolver: Arc<dyn TagResolver>,
        tag_pool: Pool<TagSet>,
        sample_pool: Pool<Vec<MetricSample>>,
        outputs: Outputs,
    ) -> Result<Self, InvalidConfig> {
        config.validate()?;

        Ok(Self {
            parser: Parser::new(tag_pool),
            enricher: Enricher::new(config, resolver),
            converter: Converter::new(config),
            batcher: Batcher::new(config.batch_size, sample_pool, outputs)?,
        })
    }

    /// Processes a group of packets and flushes all resulting records.
    ///
    /// Malformed messages are counted and skipped. Events without a timestamp are stamped with
    /// the current time.
    pub fn process_packets(&mut self, packets: &[Packet]) -> ProcessReport {
        let timestamp = chrono::Utc::now().timestamp();

        metric!(timer(DogStatsdTimers::ProcessPackets), {
            let mut report = ProcessReport::default();
            for packet in packets {
                self.process_packet(packet, timestamp, &mut report);
            }
            self.batcher.flush();
            report
        })
    }

    fn process_packet(&mut self, packet: &Packet, timestamp: i64, report: &mut ProcessReport) {
        metric!(counter(DogStatsdCounters::PacketsReceived) += 1);

        let Self {
            parser,
            enricher,
            converter,
            batcher,
        } = self;

        let origin = packet.origin.as_deref();

        for result in parser.parse_packet(&packet.contents, timestamp) {
            let mut message = match result {
                Ok(message) => message,
                Err(error) => {
                    report.errors += 1;
                    parse_failed(&error, &packet.contents);
                    continue;
                }
            };

            metric!(
                counter(DogStatsdCounters::Processed) += 1,
                message_type = message.ty().as_str(),
                state = "ok"
            );

            match &mut message {
                Message::Metric(metric) => {
                    report.metrics += 1;
                    let container_id = metric.container_id;
                    let host = enricher.enrich_tags(&mut metric.tags, || {
                        enricher.origin_tags(origin, container_id)
                    });
                    converter.convert_metric(metric, &host, |sample| batcher.append_sample(sample));
                }
                Message::Event(event) => {
                    report.events += 1;
                    let container_id = event.container_id;
                    let host = enricher.enrich_tags(&mut event.tags, || {
                        enricher.origin_tags(origin, container_id)
                    });
                    batcher.append_event(converter.convert_event(event, &host));
                }
                Message::ServiceCheck(check) => {
                    report.service_checks += 1;
                    let container_id = check.container_id;
                    let host = enricher.enrich_tags(&mut check.tags, || {
                        enricher.origin_tags(origin, container_id)
                    });
                    batcher.append_service_check(converter.convert_service_check(check, &host));
                }
            }
        }
    }

    /// Sends all pending records.
    pub fn flush(&mut self) {
        self.batcher.flush();
    }

    /// Limits how long flushing may block, see [`Batcher::set_deadline`].
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.batcher.set_deadline(deadline);
    }

    /// Returns the current flush deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.batcher.deadline()
    }

    /// Interrupts blocked flushes on stop, see [`Batcher::set_stop`].
    pub fn set_stop(&mut self, stop: Receiver<()>, grace: Duration) {
        self.batcher.set_stop(stop, grace);
    }
}

fn parse_failed(error: &ParseError, packet: &Bytes) {
    metric!(
        counter(DogStatsdCounters::Processed) += 1,
        message_type = error.ty.as_str(),
        state = "error"
    );

    if let Some(count) = PARSE_FAILURES.sample() {
        intake_log::warn!(
            count,
            packet = %String::from_utf8_lossy(packet),
            "dropping dogstatsd message: {}",
            LogError(error)
        );
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::batch::{sample_pool, Receivers};
    use crate::protocol::{AlertType, EventPriority, ServiceCheckStatus};
    use crate::sample::{MetricType, SampleValue};
    use crate::tagger::{StaticResolver, TagCardinality};
    use crate::tags::tag_pool;

    fn processor(config: DogStatsdConfig, resolver: StaticResolver) -> (Processor, Receivers) {
        let (outputs, receivers) = Outputs::bounded(64);
        let processor = Processor::new(
            &config,
            Arc::new(resolver),
            tag_pool(16),
            sample_pool(config.batch_size, 16),
            outputs,
        )
        .unwrap();
        (processor, receivers)
    }

    fn config() -> DogStatsdConfig {
        DogStatsdConfig {
            hostname: "default-host".to_owned(),
            batch_size: 4,
            ..Default::default()
        }
    }

    fn all_samples(receivers: &Receivers) -> Vec<MetricSample> {
        receivers
            .samples
            .try_iter()
            .flat_map(|batch| batch.to_vec())
            .collect()
    }

    #[test]
    fn test_process_histogram_scenario() {
        let (mut processor, receivers) = processor(config(), StaticResolver::new());
        let packet = Packet::new("daemon:666|h|@0.5|#sometag1:somevalue1,sometag2:somevalue2");

        let report = processor.process_packets(&[packet]);

        assert_eq!(
            report,
            ProcessReport {
                metrics: 1,
                ..Default::default()
            }
        );
        assert_eq!(
            all_samples(&receivers),
            [MetricSample {
                host: "default-host".to_owned(),
                name: "daemon".to_owned(),
                tags: vec![
                    "sometag1:somevalue1".to_owned(),
                    "sometag2:somevalue2".to_owned()
                ],
                ty: MetricType::Histogram,
                value: SampleValue::Value(666.0),
                sample_rate: 0.5,
            }]
        );
    }

    #[test]
    fn test_mixed_packet_with_errors() {
        intake_log::init_test!();

        let (mut processor, receivers) = processor(config(), StaticResolver::new());
        let packets = [
            Packet::new("a:1|c\nbad line\n_e{5,4}:title|text|d:21|h:localhost|p:low|t:warning"),
            Packet::new("_sc|agent.up|21\n_sc|agent.up|0|d:21|h:localhost|#tag1:test,tag2|m:this is fine"),
        ];

        let captures = intake_statsd::with_capturing_test_client(|| {
            let report = processor.process_packets(&packets);
            assert_eq!(
                report,
                ProcessReport {
                    metrics: 1,
                    events: 1,
                    service_checks: 1,
                    errors: 2,
                }
            );
        });

        assert!(captures.contains(
            &"dogstatsd.processed:1|c|#message_type:metrics,state:error".to_owned()
        ));
        assert!(captures.contains(
            &"dogstatsd.processed:1|c|#message_type:service_checks,state:error".to_owned()
        ));
        assert!(captures.contains(&"dogstatsd.packets:1|c".to_owned()));

        assert_eq!(all_samples(&receivers).len(), 1);

        let events = receivers.events.try_recv().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "title");
        assert_eq!(events[0].text, "text");
        assert_eq!(events[0].timestamp, 21);
        assert_eq!(events[0].host, "localhost");
        assert_eq!(events[0].priority, EventPriority::Low);
        assert_eq!(events[0].alert_type, AlertType::Warning);

        let checks = receivers.service_checks.try_recv().unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].name, "agent.up");
        assert_eq!(checks[0].status, ServiceCheckStatus::Ok);
        assert_eq!(checks[0].host, "localhost");
        assert_eq!(checks[0].tags, ["tag1:test", "tag2"]);
        assert_eq!(checks[0].message.as_deref(), Some("this is fine"));
    }

    #[test]
    fn test_origin_and_entity_tags() {
        let resolver = StaticResolver::new()
            .with_tags("container_id://web", TagCardinality::Low, ["image:web"])
            .with_tags("container_id://sidecar", TagCardinality::Low, ["image:proxy"])
            .with_tags("kubernetes_pod_uid://pod-1", TagCardinality::Low, ["pod:one"]);
        let (mut processor, receivers) = processor(config(), resolver);

        let packets = [
            Packet::new("a:1|c|#host:h1").with_origin("container_id://web"),
            Packet::new("b:1|c|c:sidecar").with_origin("container_id://web"),
            Packet::new("c:1|c|#dd.internal.entity_id:pod-1").with_origin("container_id://web"),
            Packet::new("_sc|d|0|#host:h2,x"),
        ];
        processor.process_packets(&packets);

        let samples = all_samples(&receivers);
        let summary: Vec<_> = samples
            .iter()
            .map(|s| (s.name.as_str(), s.host.as_str(), s.tags.clone()))
            .collect();

        assert_eq!(
            summary,
            [
                ("a", "h1", vec!["image:web".to_owned()]),
                ("b", "default-host", vec!["image:proxy".to_owned()]),
                (
                    "c",
                    "default-host",
                    vec!["image:web".to_owned(), "pod:one".to_owned()]
                ),
            ]
        );

        let checks = receivers.service_checks.try_recv().unwrap();
        assert_eq!(checks[0].host, "h2");
        assert_eq!(checks[0].tags, ["x"]);
    }

    #[test]
    fn test_samples_flushed_in_order_across_batches() {
        let (mut processor, receivers) = processor(config(), StaticResolver::new());

        let payload: String = (0..10).map(|i| format!("m:{i}|g\n")).collect();
        processor.process_packets(&[Packet::new(payload)]);

        let batches: Vec<_> = receivers.samples.try_iter().collect();
        let sizes: Vec<_> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, [4, 4, 2]);

        let values: Vec<_> = batches
            .iter()
            .flat_map(|b| b.iter().map(|s| s.value.clone()))
            .collect();
        let expected: Vec<_> = (0..10).map(|i| SampleValue::Value(i as f64)).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_multi_value_and_namespace() {
        let config = DogStatsdConfig {
            namespace: "app.".to_owned(),
            namespace_blacklist: vec!["datadog.".to_owned()],
            ..config()
        };
        let (mut processor, receivers) = processor(config, StaticResolver::new());

        processor.process_packets(&[Packet::new("lat:1:2:3|ms\ndatadog.x:1|c")]);

        let names: Vec<_> = all_samples(&receivers)
            .into_iter()
            .map(|s| (s.name, s.ty))
            .collect();
        assert_eq!(
            names,
            [
                ("app.lat".to_owned(), MetricType::Histogram),
                ("app.lat".to_owned(), MetricType::Histogram),
                ("app.lat".to_owned(), MetricType::Histogram),
                ("datadog.x".to_owned(), MetricType::Counter),
            ]
        );
    }

    #[test]
    fn test_invalid_config() {
        let (outputs, _receivers) = Outputs::bounded(1);
        let config = DogStatsdConfig {
            batch_size: 0,
            ..Default::default()
        };
        let result = Processor::new(
            &config,
            Arc::new(StaticResolver::new()),
            tag_pool(1),
            sample_pool(1, 1),
            outputs,
        );
        assert_eq!(result.unwrap_err(), InvalidConfig::BatchSize);
    }
}
