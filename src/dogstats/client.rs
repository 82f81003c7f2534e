use std::mem;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use super::codec::encode_into;
use super::server::StatsdOptions;
use super::writer::{UdpSocketWriter, Writer};
use super::{MetricType, SampleRate, Tag};
use crate::MetricResult;

/// Trait defining the interface for sending metrics.
///
/// Every call is fire-and-forget: delivery failures are logged and never
/// returned to the caller.
pub trait MetricSenderTrait {
    /// Sends one metric.
    fn send(
        &self,
        metric: &str,
        value: i64,
        metric_type: MetricType,
        tags: &[Tag<'_>],
        sample_rate: SampleRate,
    );

    /// Increments a counter by `by`.
    fn increment(&self, metric: &str, by: i64, tags: &[Tag<'_>], sample_rate: SampleRate) {
        self.send(metric, by, MetricType::Count, tags, sample_rate);
    }

    /// Records a gauge value representing a point-in-time measurement.
    fn gauge(&self, metric: &str, value: i64, tags: &[Tag<'_>], sample_rate: SampleRate) {
        self.send(metric, value, MetricType::Gauge, tags, sample_rate);
    }

    /// Sends an already measured timing in milliseconds.
    fn timing_value(&self, metric: &str, millis: i64, tags: &[Tag<'_>], sample_rate: SampleRate) {
        self.send(metric, millis, MetricType::Timing, tags, sample_rate);
    }

    /// Measures the wall-clock time of `block` and sends it as a timing.
    ///
    /// The timing is sent even when `block` returns an error, which is handed
    /// back unchanged, or panics, in which case the panic keeps unwinding.
    fn timing<T, F>(&self, metric: &str, tags: &[Tag<'_>], sample_rate: SampleRate, block: F) -> T
    where
        Self: Sized,
        F: FnOnce() -> T,
    {
        let _guard = self.start_timer(metric, tags, sample_rate);
        block()
    }

    /// Starts a timer that sends the elapsed time when dropped.
    fn start_timer<'a>(
        &'a self,
        metric: &'a str,
        tags: &'a [Tag<'a>],
        sample_rate: SampleRate,
    ) -> TimingGuard<'a, Self>
    where
        Self: Sized,
    {
        TimingGuard {
            sender: self,
            metric,
            tags,
            sample_rate,
            start: Instant::now(),
        }
    }
}

/// Sends the time elapsed since its creation as a timing when dropped.
///
/// Created by [`MetricSenderTrait::start_timer`].
#[must_use = "the timing is sent when the guard is dropped"]
pub struct TimingGuard<'a, C: MetricSenderTrait> {
    sender: &'a C,
    metric: &'a str,
    tags: &'a [Tag<'a>],
    sample_rate: SampleRate,
    start: Instant,
}

impl<C: MetricSenderTrait> TimingGuard<'_, C> {
    /// Time elapsed since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<C: MetricSenderTrait> Drop for TimingGuard<'_, C> {
    fn drop(&mut self) {
        let millis = round_millis(self.start.elapsed());
        self.sender
            .timing_value(self.metric, millis, self.tags, self.sample_rate);
    }
}

/// Rounds to the nearest millisecond.
fn round_millis(elapsed: Duration) -> i64 {
    i64::try_from((elapsed.as_micros() + 500) / 1000).unwrap_or(i64::MAX)
}

/// A fire-and-forget StatsD client.
///
/// Every metric name is prefixed with `<namespace>.` and sent as its own
/// datagram on the caller's thread. This type is `Send + Sync` when its
/// writer is, and can be shared across threads via `Arc<StatsdClient>`.
///
/// # Example
///
/// ```no_run
/// use rylv_statsd::{MetricSenderTrait, SampleRate, StatsdClient, StatsdOptions};
///
/// let client = StatsdClient::new(&StatsdOptions::default()).unwrap();
/// client.increment("requests", 1, &[("endpoint", "api")], SampleRate::ONE);
/// client.gauge("connections", 100, &[], SampleRate::new(0.5).unwrap());
/// ```
pub struct StatsdClient<W = UdpSocketWriter> {
    namespace: String,
    writer: W,
    // reused between sends to avoid an allocation per metric, never locked
    // across a write
    buffer: Mutex<String>,
}

impl StatsdClient<UdpSocketWriter> {
    /// Creates a client sending to `options.host:options.port` under `options.namespace`.
    ///
    /// # Errors
    /// Returns [`crate::MetricsError::Resolve`] if the destination does not
    /// resolve and [`crate::MetricsError::StdIo`] if no local socket can be bound.
    pub fn new(options: &StatsdOptions) -> MetricResult<Self> {
        let writer = UdpSocketWriter::connect(&options.host, options.port)?;
        Ok(Self::with_writer(writer, options.namespace.clone()))
    }
}

impl<W: Writer> StatsdClient<W> {
    /// Creates a client sending datagrams through `writer`.
    pub fn with_writer(writer: W, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            writer,
            buffer: Mutex::new(String::with_capacity(256)),
        }
    }

    /// The namespace prepended to every metric name.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl<W: Writer> MetricSenderTrait for StatsdClient<W> {
    fn send(
        &self,
        metric: &str,
        value: i64,
        metric_type: MetricType,
        tags: &[Tag<'_>],
        sample_rate: SampleRate,
    ) {
        let mut buffer = mem::take(&mut *self.buffer.lock());
        buffer.clear();
        encode_into(
            &mut buffer,
            &self.namespace,
            metric,
            value,
            metric_type,
            sample_rate,
            tags,
        );

        if let Err(err) = self.writer.write(buffer.as_bytes()) {
            warn!("Error sending metric {metric}: {err}");
        }

        let mut slot = self.buffer.lock();
        if slot.capacity() < buffer.capacity() {
            *slot = buffer;
        }
    }
}
