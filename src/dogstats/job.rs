use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{tick, Receiver};
use crossbeam::select;
use itoa::Buffer;
use tracing::{debug, error, warn};

use super::aggregator::{Snapshot, TimingSummary};
use super::writer::{FlushWriterHolder, FlushWriterTrait};
use super::{Aggregator, MetricType};

// a zero interval would make the ticker fire continuously
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

struct FlushJob {
    aggregator: Arc<Aggregator>,
    buffer: Buffer,
    flush_writer: FlushWriterHolder,
}

impl FlushJob {
    /// Drains the aggregator and hands every value to the flush writer.
    /// Returns the number of records the writer emitted.
    fn flush(&mut self) -> usize {
        let snapshot = self.aggregator.drain();
        if snapshot.is_empty() {
            return 0;
        }

        // the guard resets the writer when dropped, even if the flush fails half way
        let mut writer = self.flush_writer.acquire();
        Self::process_snapshot(&mut writer, &mut self.buffer, &snapshot);

        match writer.flush() {
            Ok(records) => {
                debug!("Flushed {records} aggregated records");
                records
            }
            Err(err) => {
                error!("Error flushing metrics: {err}");
                0
            }
        }
    }

    fn process_snapshot(writer: &mut dyn FlushWriterTrait, buffer: &mut Buffer, snapshot: &Snapshot) {
        for (metric, count) in &snapshot.counters {
            Self::send_metric(writer, &[metric.as_str()], buffer.format(*count), MetricType::Count);
        }

        for (metric, value) in &snapshot.gauges {
            Self::send_metric(writer, &[metric.as_str()], buffer.format(*value), MetricType::Gauge);
        }

        for (metric, summary) in &snapshot.timings {
            Self::process_timing(writer, buffer, metric, summary);
        }
    }

    fn process_timing(
        writer: &mut dyn FlushWriterTrait,
        buffer: &mut Buffer,
        metric: &str,
        summary: &TimingSummary,
    ) {
        Self::send_metric(
            writer,
            &[metric, ".count"],
            buffer.format(summary.count),
            MetricType::Count,
        );

        let stats = [
            (".min", summary.min),
            (".max", summary.max),
            (".p50", summary.p50),
            (".p99", summary.p99),
        ];
        for (suffix, value) in stats {
            Self::send_metric(writer, &[metric, suffix], buffer.format(value), MetricType::Gauge);
        }
    }

    fn send_metric(
        writer: &mut dyn FlushWriterTrait,
        metric: &[&str],
        value: &str,
        metric_type: MetricType,
    ) {
        if let Err(err) = writer.write(metric, value, metric_type) {
            warn!("Dropping aggregated metric {}: {err}", metric.concat());
        }
    }

    /// Runs one flush, containing a panicking writer so the timer survives it.
    fn flush_guarded(&mut self) {
        if catch_unwind(AssertUnwindSafe(|| self.flush())).is_err() {
            error!("Flush job panicked, the next tick will retry");
        }
    }
}

/// Flushes the aggregator every `flush_interval` until `receiver` yields or
/// disconnects, then performs a final flush and hands the writer back.
pub fn run_flush_job(
    aggregator: Arc<Aggregator>,
    flush_writer: FlushWriterHolder,
    flush_interval: Duration,
    receiver: &Receiver<()>,
) -> FlushWriterHolder {
    let mut job = FlushJob {
        aggregator,
        buffer: Buffer::new(),
        flush_writer,
    };

    let ticker = tick(flush_interval.max(MIN_FLUSH_INTERVAL));

    loop {
        select! {
            recv(ticker) -> _ => job.flush_guarded(),
            recv(receiver) -> _ => {
                job.flush_guarded();
                return job.flush_writer;
            },
        }
    }
}
