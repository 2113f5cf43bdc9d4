use intake_statsd::{CounterMetric, DistributionMetric, TimerMetric};

/// Counter metrics of the DogStatsD pipeline.
pub enum DogStatsdCounters {
    /// Incremented for every received packet.
    PacketsReceived,

    /// Incremented for every parsed message.
    ///
    /// Tagged by `message_type` (`metrics`, `events`, `service_checks`) and `state` (`ok`,
    /// `error`).
    Processed,

    /// Incremented every time an object is taken from a pool.
    ///
    /// Tagged by `pool`.
    PoolGet,

    /// Incremented every time an object is returned to a pool.
    ///
    /// Tagged by `pool`.
    PoolPut,

    /// Incremented when the tag catalog fails to resolve an entity.
    TagResolutionFailed,

    /// Incremented when an output batch cannot be handed to its channel.
    ///
    /// This happens if the receiving side has shut down, or if the shutdown deadline passes while
    /// the channel is full. Tagged by `kind`.
    BatchesDropped,

    /// Number of packets still queued when the shutdown grace period ran out.
    PacketsDroppedOnShutdown,
}

impl CounterMetric for DogStatsdCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::PacketsReceived => "dogstatsd.packets",
            Self::Processed => "dogstatsd.processed",
            Self::PoolGet => "dogstatsd.pool_get",
            Self::PoolPut => "dogstatsd.pool_put",
            Self::TagResolutionFailed => "dogstatsd.tag_resolution_failed",
            Self::BatchesDropped => "dogstatsd.batches_dropped",
            Self::PacketsDroppedOnShutdown => "dogstatsd.shutdown_dropped_packets",
        }
    }
}

/// Distribution metrics of the DogStatsD pipeline.
pub enum DogStatsdDistributions {
    /// Number of records in a flushed batch.
    ///
    /// Tagged by `kind`.
    BatchSize,
}

impl DistributionMetric for DogStatsdDistributions {
    fn name(&self) -> &'static str {
        match *self {
            Self::BatchSize => "dogstatsd.batch_size",
        }
    }
}

/// Timer metrics of the DogStatsD pipeline.
pub enum DogStatsdTimers {
    /// Time spent processing one group of packets, including the final flush.
    ProcessPackets,
}

impl TimerMetric for DogStatsdTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::ProcessPackets => "dogstatsd.process_duration",
        }
    }
}
