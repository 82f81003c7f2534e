use std::cmp::{max, min};
use std::collections::BTreeMap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hdrhistogram::Histogram;

use crate::{DefaultMetricHasher, MetricResult, MetricsError};

/// Highest timing tracked with full precision: one day in milliseconds.
/// Larger values are clamped.
const MAX_TIMING_MS: u64 = 24 * 60 * 60 * 1000;

pub const SIG_FIG_MAX: u8 = 5;
pub const SIG_FIG_DEF: u8 = 3;
const _: () = assert!(SIG_FIG_DEF <= SIG_FIG_MAX);

/// Number of significant figures kept by timing histograms (0..=5).
///
/// Higher values increase precision but also memory usage.
/// Use [`SigFig::default()`] for the default value of 3.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SigFig {
    value: u8,
}

impl SigFig {
    /// Creates a new `SigFig` with the given number of significant figures (0..=5).
    ///
    /// # Errors
    /// Returns [`MetricsError`] if `value` exceeds 5.
    pub fn new(value: u8) -> Result<Self, MetricsError> {
        if value > SIG_FIG_MAX {
            return Err(MetricsError::from(
                "Invalid sig fig: must be 0, 1, 2, 3, 4 or 5",
            ));
        }
        Ok(Self { value })
    }
    /// Returns the number of significant figures.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.value
    }
}

impl Default for SigFig {
    fn default() -> Self {
        Self { value: SIG_FIG_DEF }
    }
}

pub struct GaugeState {
    value: AtomicI64,
    updated: AtomicBool,
}

pub struct HistogramWrapper {
    pub min: u64,
    pub max: u64,
    pub histogram: Histogram<u64>,
}

impl HistogramWrapper {
    fn new(sig_fig: SigFig) -> MetricResult<Self> {
        Ok(Self {
            min: u64::MAX,
            max: u64::MIN,
            histogram: Histogram::new_with_bounds(1, MAX_TIMING_MS, sig_fig.value())?,
        })
    }

    pub fn reset(&mut self) {
        self.min = u64::MAX;
        self.max = u64::MIN;
        self.histogram.reset();
    }

    pub fn record(&mut self, value: u64) {
        self.min = min(self.min, value);
        self.max = max(self.max, value);
        self.histogram.saturating_record(value);
    }

    fn summary(&self) -> TimingSummary {
        TimingSummary {
            count: self.histogram.len(),
            min: self.min,
            max: self.max,
            p50: self.histogram.value_at_quantile(0.50),
            p99: self.histogram.value_at_quantile(0.99),
        }
    }
}

/// Distribution of the timings recorded for one metric during a flush window.
///
/// `min` and `max` are exact; the percentiles carry the histogram precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSummary {
    /// Number of recorded timings.
    pub count: u64,
    /// Smallest recorded timing in milliseconds.
    pub min: u64,
    /// Largest recorded timing in milliseconds.
    pub max: u64,
    /// Median in milliseconds.
    pub p50: u64,
    /// 99th percentile in milliseconds.
    pub p99: u64,
}

/// Everything accumulated since the previous drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Non-zero counter totals.
    pub counters: BTreeMap<String, i64>,
    /// Last value of every gauge updated in the window.
    pub gauges: BTreeMap<String, i64>,
    /// Summary of every timing recorded in the window.
    pub timings: BTreeMap<String, TimingSummary>,
}

impl Snapshot {
    /// Whether nothing was accumulated in the window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty() && self.timings.is_empty()
    }
}

/// Concurrent in-memory aggregation tables keyed by metric name.
///
/// Counters are summed, gauges keep their last value and timings are recorded
/// into a histogram. Every operation takes `&self`, so one instance is shared
/// between the ingestion loop and the flush job. A drain never loses an update
/// made concurrently: it lands either in the current or in the next drain.
pub struct Aggregator<S = DefaultMetricHasher> {
    counters: DashMap<String, AtomicI64, S>,
    gauges: DashMap<String, GaugeState, S>,
    timings: DashMap<String, HistogramWrapper, S>,
    sig_fig: SigFig,
}

impl Default for Aggregator<DefaultMetricHasher> {
    fn default() -> Self {
        Self::with_hasher_builder(DefaultMetricHasher::new(), SigFig::default())
    }
}

impl<S> Aggregator<S>
where
    S: BuildHasher + Clone,
{
    /// Creates empty tables using `hasher_builder` for the maps and `sig_fig`
    /// for new timing histograms.
    pub fn with_hasher_builder(hasher_builder: S, sig_fig: SigFig) -> Self {
        Self {
            counters: DashMap::with_hasher(hasher_builder.clone()),
            gauges: DashMap::with_hasher(hasher_builder.clone()),
            timings: DashMap::with_hasher(hasher_builder),
            sig_fig,
        }
    }

    /// Adds `delta` to the counter `name`, creating it on first use.
    ///
    /// The sum saturates at the `i64` bounds.
    pub fn increment(&self, name: &str, delta: i64) {
        // fast path using the shard read lock only
        if let Some(counter) = self.counters.get(name) {
            saturating_add(&counter, delta);
            return;
        }

        let counter = self
            .counters
            .entry(name.to_owned())
            .or_insert_with(|| AtomicI64::new(0));
        saturating_add(&counter, delta);
    }

    /// Sets the gauge `name` to `value`.
    pub fn set_gauge(&self, name: &str, value: i64) {
        if let Some(gauge) = self.gauges.get(name) {
            gauge.value.store(value, Ordering::SeqCst);
            gauge.updated.store(true, Ordering::SeqCst);
            return;
        }

        let gauge = self
            .gauges
            .entry(name.to_owned())
            .or_insert_with(|| GaugeState {
                value: AtomicI64::new(0),
                updated: AtomicBool::new(false),
            });
        gauge.value.store(value, Ordering::SeqCst);
        gauge.updated.store(true, Ordering::SeqCst);
    }

    /// Records a timing in milliseconds for `name`.
    ///
    /// # Errors
    /// Returns an error for negative timings or when the histogram cannot be created.
    pub fn record_timing(&self, name: &str, millis: i64) -> MetricResult<()> {
        let Ok(millis) = u64::try_from(millis) else {
            return Err(format!("Negative timing {millis} for {name}").into());
        };

        if let Some(mut histogram) = self.timings.get_mut(name) {
            histogram.record(millis);
            return Ok(());
        }

        let mut histogram = match self.timings.entry(name.to_owned()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => entry.insert(HistogramWrapper::new(self.sig_fig)?),
        };
        histogram.record(millis);
        Ok(())
    }

    /// Captures every non-zero counter and resets it to zero.
    ///
    /// Each value is swapped atomically, so an increment racing the drain is
    /// reported by this drain or by the next one. Counters that were already
    /// zero, idle for a whole window, are evicted.
    pub fn drain_counters(&self) -> BTreeMap<String, i64> {
        let mut drained = BTreeMap::new();
        let mut keys_to_remove = Vec::new();

        for entry in &self.counters {
            let value = entry.value().swap(0, Ordering::SeqCst);
            if value == 0 {
                keys_to_remove.push(entry.key().clone());
            } else {
                drained.insert(entry.key().clone(), value);
            }
        }

        for key in &keys_to_remove {
            // the shard write lock excludes readers, so a concurrent increment
            // either made the value non-zero or will recreate the entry
            self.counters
                .remove_if(key, |_, value| value.load(Ordering::SeqCst) == 0);
        }
        drained
    }

    /// Captures the last value of every gauge updated since the previous drain.
    pub fn drain_gauges(&self) -> BTreeMap<String, i64> {
        let mut drained = BTreeMap::new();
        let mut keys_to_remove = Vec::new();

        for entry in &self.gauges {
            if entry.updated.swap(false, Ordering::SeqCst) {
                drained.insert(entry.key().clone(), entry.value.load(Ordering::SeqCst));
            } else {
                keys_to_remove.push(entry.key().clone());
            }
        }

        for key in &keys_to_remove {
            self.gauges
                .remove_if(key, |_, gauge| !gauge.updated.load(Ordering::SeqCst));
        }
        drained
    }

    /// Summarizes and resets every timing histogram with recorded values.
    pub fn drain_timings(&self) -> BTreeMap<String, TimingSummary> {
        let mut drained = BTreeMap::new();
        let mut keys_to_remove = Vec::new();

        for mut entry in self.timings.iter_mut() {
            if entry.histogram.is_empty() {
                keys_to_remove.push(entry.key().clone());
            } else {
                drained.insert(entry.key().clone(), entry.summary());
                entry.reset();
            }
        }

        for key in &keys_to_remove {
            self.timings
                .remove_if(key, |_, histogram| histogram.histogram.is_empty());
        }
        drained
    }

    /// Drains all tables.
    pub fn drain(&self) -> Snapshot {
        Snapshot {
            counters: self.drain_counters(),
            gauges: self.drain_gauges(),
            timings: self.drain_timings(),
        }
    }

    /// Number of metric entries currently held, idle ones included.
    #[must_use]
    pub fn tracked_metrics(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.timings.len()
    }
}

fn saturating_add(counter: &AtomicI64, delta: i64) {
    // the closure always returns Some, so fetch_update cannot fail
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        Some(current.saturating_add(delta))
    });
}
