use std::fmt;

use crate::MetricsError;

mod aggregator;
pub mod client;
pub mod codec;
mod forwarder;
pub mod instrument;
mod job;
mod listener;
pub mod macros;
mod net;
pub mod server;
pub mod writer;

pub use aggregator::{Aggregator, SigFig, Snapshot, TimingSummary};

/// A tag attached to a metric, written on the wire as `key:value`.
pub type Tag<'a> = (&'a str, &'a str);

/// The metric types understood by the wire protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Counter, wire type `c`. Summed on aggregation.
    Count,
    /// Gauge, wire type `g`. Last value wins on aggregation.
    Gauge,
    /// Timing in milliseconds, wire type `ms`. Aggregated into a histogram.
    Timing,
}

impl MetricType {
    /// Returns the wire representation of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "c",
            Self::Gauge => "g",
            Self::Timing => "ms",
        }
    }

    /// Parses a wire type. Only `c`, `g` and `ms` are accepted.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "c" => Some(Self::Count),
            "g" => Some(Self::Gauge),
            "ms" => Some(Self::Timing),
            _ => None,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraction of events a client reports, in `(0, 1]`.
///
/// A rate below one is written on the wire as `|@<rate>`. The client does not
/// drop events itself; the rate is informational for the receiving collector.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct SampleRate {
    value: f64,
}

impl SampleRate {
    /// Every event is reported.
    pub const ONE: Self = Self { value: 1.0 };

    /// Creates a new sample rate.
    ///
    /// # Errors
    /// Returns [`MetricsError::InvalidSampleRate`] if `value` is not in `(0, 1]`.
    pub fn new(value: f64) -> Result<Self, MetricsError> {
        if value > 0.0 && value <= 1.0 {
            Ok(Self { value })
        } else {
            Err(MetricsError::InvalidSampleRate(value))
        }
    }

    /// Returns the rate.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.value
    }

    /// Whether the rate has to be written on the wire.
    #[must_use]
    pub fn is_sampled(self) -> bool {
        self.value < 1.0
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::ONE
    }
}
