//! Internal measurements of the intake, reported to a statsd server through `cadence`.
//!
//! ## Defining Metrics
//!
//! Metrics are declared as enums implementing one of the metric traits: [`CounterMetric`],
//! [`GaugeMetric`], [`DistributionMetric`] or [`TimerMetric`]. The traits only provide a type
//! safe metric name, so that a counter cannot accidentally be recorded as a timer.
//!
//! ## Initializing the Client
//!
//! Recording metrics without a configured client is a noop. Either pass a custom client to
//! [`set_client`], or call [`init`] to report to a statsd server over UDP:
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! use intake_statsd::MetricsClientConfig;
//!
//! intake_statsd::init(MetricsClientConfig {
//!     prefix: "intake",
//!     host: "127.0.0.1:8125",
//!     default_tags: BTreeMap::new(),
//!     sample_rate: 1.0,
//!     queue_size: 10_000,
//! })
//! .ok();
//! ```
//!
//! ## Recording
//!
//! ```
//! use intake_statsd::{metric, CounterMetric};
//!
//! enum PacketCounters {
//!     Received,
//! }
//!
//! impl CounterMetric for PacketCounters {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::Received => "dogstatsd.packets",
//!         }
//!     }
//! }
//!
//! metric!(counter(PacketCounters::Received) += 1, listener = "udp");
//! ```

use std::collections::BTreeMap;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::ops::Deref;
use std::sync::Arc;

use cadence::{
    BufferedUdpMetricSink, Metric, MetricBuilder, MetricResult, QueuingMetricSink, StatsdClient,
};
use parking_lot::RwLock;
use rand::Rng;

/// A statsd client together with the defaults applied to every metric.
#[derive(Debug)]
pub struct MetricsClient {
    /// The raw statsd client.
    pub statsd_client: StatsdClient,
    /// Tags added to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Fraction of metrics that is sent, between `0.0` and `1.0`.
    pub sample_rate: f64,
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

impl MetricsClient {
    /// Sends a metric with the default tags of this client.
    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        if !self.should_send() {
            return;
        }

        for (key, value) in &self.default_tags {
            metric = metric.with_tag(key, value);
        }

        if self.sample_rate < 1.0 {
            metric = metric.with_sampling_rate(self.sample_rate);
        }

        if let Err(error) = metric.try_send() {
            intake_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to send internal metric"
            );
        }
    }

    fn should_send(&self) -> bool {
        if self.sample_rate <= 0.0 {
            false
        } else if self.sample_rate >= 1.0 {
            true
        } else {
            rand::rng().random_bool(self.sample_rate)
        }
    }
}

/// Configuration for [`init`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix prepended to all metric names.
    pub prefix: &'a str,
    /// Address of the statsd server.
    pub host: A,
    /// Tags added to all metrics.
    pub default_tags: BTreeMap<String, String>,
    /// Fraction of metrics that is sent, between `0.0` and `1.0`.
    pub sample_rate: f64,
    /// Number of metrics buffered before new ones are dropped.
    pub queue_size: usize,
}

static METRICS_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    static CURRENT_CLIENT: std::cell::RefCell<Option<Arc<MetricsClient>>> =
        METRICS_CLIENT.read().clone().into();
}

#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// The metrics prelude that is necessary to use the client.
pub mod prelude {
    pub use cadence::prelude::*;
}

/// Sets a new global statsd client.
///
/// Threads that already recorded a metric keep their previous client.
pub fn set_client(client: MetricsClient) {
    *METRICS_CLIENT.write() = Some(Arc::new(client));
    CURRENT_CLIENT.with(|cell| cell.replace(METRICS_CLIENT.read().clone()));
}

/// Disables the global client.
pub fn disable() {
    *METRICS_CLIENT.write() = None;
    CURRENT_CLIENT.with(|cell| cell.replace(None));
}

/// Reports metrics to the statsd server in `config.host`.
///
/// Metrics are queued and sent from a background thread in batched UDP datagrams. Once the queue
/// holds `queue_size` metrics, new metrics are dropped.
pub fn init<A: ToSocketAddrs>(config: MetricsClientConfig<'_, A>) -> MetricResult<()> {
    let addr = config.host.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "statsd host did not resolve")
    })?;

    intake_log::info!("reporting internal metrics to statsd at {addr}");
    if config.sample_rate <= 0.0 {
        intake_log::debug!("metrics sample rate is 0, no metrics will be reported");
    }

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let udp_sink = BufferedUdpMetricSink::from(addr, socket)?;
    let queuing_sink = QueuingMetricSink::with_capacity(udp_sink, config.queue_size);

    set_client(MetricsClient {
        statsd_client: StatsdClient::from_sink(config.prefix, queuing_sink),
        default_tags: config.default_tags,
        sample_rate: config.sample_rate.clamp(0.0, 1.0),
    });

    Ok(())
}

/// Invokes a callback with the current statsd client.
///
/// If no client is configured, the callback is not invoked and the default value is returned.
/// Prefer the [`metric!`] macro.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    CURRENT_CLIENT.with(|client| match client.borrow().as_deref() {
        Some(client) => f(client),
        None => R::default(),
    })
}

/// Captures all metrics recorded by `f` on the current thread.
///
/// Returns the captured metrics in statsd line format.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let test_client = MetricsClient {
        statsd_client: StatsdClient::from_sink("", sink),
        default_tags: BTreeMap::new(),
        sample_rate: 1.0,
    };

    CURRENT_CLIENT.with(|cell| {
        let old_client = cell.replace(Some(Arc::new(test_client)));
        f();
        cell.replace(old_client);
    });

    rx.try_iter()
        .map(|line| String::from_utf8_lossy(&line).into_owned())
        .collect()
}

/// A metric counting occurrences.
///
/// ```
/// use intake_statsd::{metric, CounterMetric};
///
/// enum Counters {
///     Processed,
/// }
///
/// impl CounterMetric for Counters {
///     fn name(&self) -> &'static str {
///         "dogstatsd.processed"
///     }
/// }
///
/// metric!(counter(Counters::Processed) += 1, message_type = "metrics", state = "ok");
/// ```
pub trait CounterMetric {
    /// Returns the name sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric holding an instantaneous value.
pub trait GaugeMetric {
    /// Returns the name sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric recording a distribution of values, such as batch sizes.
pub trait DistributionMetric {
    /// Returns the name sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric recording durations in milliseconds.
///
/// ```
/// use intake_statsd::{metric, TimerMetric};
///
/// struct ProcessDuration;
///
/// impl TimerMetric for ProcessDuration {
///     fn name(&self) -> &'static str {
///         "dogstatsd.process_duration"
///     }
/// }
///
/// let count = metric!(timer(ProcessDuration), { 2 + 2 });
/// assert_eq!(count, 4);
/// ```
pub trait TimerMetric {
    /// Returns the name sent to statsd.
    fn name(&self) -> &'static str;
}

/// Records a metric on the current client.
///
/// See the [crate-level documentation](self) for examples.
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        match $value {
            value if value != 0 => $crate::with_client(|client| {
                use $crate::_pred::*;
                client.send_metric(
                    client.count_with_tags(&$crate::CounterMetric::name(&$id), value)
                        $(.with_tag(stringify!($k), $v))*
                )
            }),
            _ => {}
        }
    };

    (gauge($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.gauge_with_tags(&$crate::GaugeMetric::name(&$id), $value)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    (distribution($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.distribution_with_tags(&$crate::DistributionMetric::name(&$id), $value)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    (timer($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.distribution_with_tags(
                    &$crate::TimerMetric::name(&$id),
                    $value.as_nanos() as f64 / 1e6,
                )
                $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    (timer($id:expr), $($k:ident = $v:expr,)* $block:block) => {{
        let start = ::std::time::Instant::now();
        let rv = { $block };
        $crate::metric!(timer($id) = start.elapsed() $(, $k = $v)*);
        rv
    }};
}
