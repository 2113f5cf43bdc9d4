//! Batching of converted records into output channels.

use std::mem;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Select, SendTimeoutError, Sender};
use intake_statsd::metric;

use crate::config::InvalidConfig;
use crate::pool::{Pool, Pooled};
use crate::sample::{Event, MetricSample, ServiceCheck};
use crate::statsd::{DogStatsdCounters, DogStatsdDistributions};

/// A batch of samples. The buffer returns to its pool when the receiver drops it.
pub type SampleBatch = Pooled<Vec<MetricSample>>;

/// Creates the shared pool of sample buffers, each with room for `batch_size` samples.
pub fn sample_pool(batch_size: usize, max_idle: usize) -> Pool<Vec<MetricSample>> {
    Pool::new("samples", max_idle, move || Vec::with_capacity(batch_size))
}

/// Sending halves of the channels to the aggregator.
#[derive(Clone, Debug)]
pub struct Outputs {
    samples: Sender<SampleBatch>,
    events: Sender<Vec<Event>>,
    service_checks: Sender<Vec<ServiceCheck>>,
}

/// Receiving halves of the channels to the aggregator.
#[derive(Clone, Debug)]
pub struct Receivers {
    /// Full or final batches of metric samples.
    pub samples: Receiver<SampleBatch>,
    /// Non-empty groups of events.
    pub events: Receiver<Vec<Event>>,
    /// Non-empty groups of service checks.
    pub service_checks: Receiver<Vec<ServiceCheck>>,
}

impl Outputs {
    /// Creates outputs from existing channels.
    pub fn new(
        samples: Sender<SampleBatch>,
        events: Sender<Vec<Event>>,
        service_checks: Sender<Vec<ServiceCheck>>,
    ) -> Self {
        Self {
            samples,
            events,
            service_checks,
        }
    }

    /// Creates three bounded channels holding up to `capacity` groups each.
    ///
    /// Flushing blocks while a channel is full.
    pub fn bounded(capacity: usize) -> (Self, Receivers) {
        let (samples, samples_rx) = crossbeam_channel::bounded(capacity);
        let (events, events_rx) = crossbeam_channel::bounded(capacity);
        let (service_checks, service_checks_rx) = crossbeam_channel::bounded(capacity);

        let receivers = Receivers {
            samples: samples_rx,
            events: events_rx,
            service_checks: service_checks_rx,
        };

        (Self::new(samples, events, service_checks), receivers)
    }
}

/// Accumulates records of one worker and flushes them to the [`Outputs`].
///
/// Samples are collected in fixed-size pooled buffers and sent as soon as a buffer is full.
/// Events and service checks are only sent by [`flush`](Self::flush). Records are sent in the
/// order they were appended.
#[derive(Debug)]
pub struct Batcher {
    samples: SampleBatch,
    events: Vec<Event>,
    service_checks: Vec<ServiceCheck>,
    batch_size: usize,
    pool: Pool<Vec<MetricSample>>,
    outputs: Outputs,
    limit: SendLimit,
}

impl Batcher {
    /// Creates a batcher sending batches of at most `batch_size` samples.
    pub fn new(
        batch_size: usize,
        pool: Pool<Vec<MetricSample>>,
        outputs: Outputs,
    ) -> Result<Self, InvalidConfig> {
        if batch_size == 0 {
            return Err(InvalidConfig::BatchSize);
        }

        Ok(Self {
            samples: pool.get(),
            events: Vec::new(),
            service_checks: Vec::new(),
            batch_size,
            pool,
            outputs,
            limit: SendLimit::default(),
        })
    }

    /// Returns the number of samples not yet flushed.
    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    /// Limits how long sends may block. Batches that cannot be sent before `deadline` are dropped.
    ///
    /// Without a deadline, sends block until the channel has room.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.limit.deadline = deadline;
    }

    /// Returns the current send deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.limit.deadline
    }

    /// Interrupts blocked sends once `stop` receives a message or disconnects.
    ///
    /// The interrupted send and all later sends get a deadline `grace` after the stop signal.
    pub fn set_stop(&mut self, stop: Receiver<()>, grace: Duration) {
        self.limit.stop = Some((stop, grace));
    }

    /// Appends a sample, sending the current batch first if it is full.
    pub fn append_sample(&mut self, sample: MetricSample) {
        if self.samples.len() >= self.batch_size {
            self.flush_samples();
        }
        self.samples.push(sample);
    }

    /// Appends an event.
    pub fn append_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Appends a service check.
    pub fn append_service_check(&mut self, check: ServiceCheck) {
        self.service_checks.push(check);
    }

    /// Sends the pending samples and starts a new buffer from the pool. Does nothing if there
    /// are no pending samples.
    pub fn flush_samples(&mut self) {
        if self.samples.is_empty() {
            return;
        }

        let batch = mem::replace(&mut self.samples, self.pool.get());
        let len = batch.len();
        if self.limit.send(&self.outputs.samples, batch, "samples") {
            metric!(
                distribution(DogStatsdDistributions::BatchSize) = len as u64,
                kind = "samples"
            );
        }
    }

    /// Sends pending samples, events and service checks.
    pub fn flush(&mut self) {
        self.flush_samples();

        if !self.events.is_empty() {
            let events = mem::take(&mut self.events);
            self.limit.send(&self.outputs.events, events, "events");
        }

        if !self.service_checks.is_empty() {
            let checks = mem::take(&mut self.service_checks);
            self.limit
                .send(&self.outputs.service_checks, checks, "service_checks");
        }
    }
}

/// Bounds how long a send may block on a full channel.
#[derive(Debug, Default)]
struct SendLimit {
    deadline: Option<Instant>,
    stop: Option<(Receiver<()>, Duration)>,
}

impl SendLimit {
    /// Sends `value` and returns `true` on success.
    fn send<T>(&mut self, sender: &Sender<T>, value: T, kind: &'static str) -> bool {
        let result = match (self.deadline, &self.stop) {
            (Some(deadline), _) => sender.send_deadline(value, deadline),
            (None, Some((stop, grace))) => {
                let mut select = Select::new();
                let send_index = select.send(sender);
                select.recv(stop);

                let oper = select.select();
                if oper.index() == send_index {
                    oper.send(sender, value)
                        .map_err(|e| SendTimeoutError::Disconnected(e.0))
                } else {
                    // A message and a disconnect both signal stop.
                    let _ = oper.recv(stop);
                    let deadline = Instant::now() + *grace;
                    self.deadline = Some(deadline);
                    sender.send_deadline(value, deadline)
                }
            }
            (None, None) => sender
                .send(value)
                .map_err(|e| SendTimeoutError::Disconnected(e.0)),
        };

        report_send(result, kind)
    }
}

fn report_send<T>(result: Result<(), SendTimeoutError<T>>, kind: &'static str) -> bool {
    match result {
        Ok(()) => true,
        Err(SendTimeoutError::Timeout(_)) => {
            metric!(counter(DogStatsdCounters::BatchesDropped) += 1, kind = kind);
            intake_log::warn!(kind, "dropping batch, shutdown deadline passed");
            false
        }
        Err(SendTimeoutError::Disconnected(_)) => {
            metric!(counter(DogStatsdCounters::BatchesDropped) += 1, kind = kind);
            intake_log::warn!(kind, "dropping batch, output channel closed");
            false
        }
    }
}
