//! # rylv-statsd
//!
//! An in-process StatsD pipeline: a fire-and-forget UDP client and a companion
//! server that aggregates, forwards and periodically flushes what it receives.
//!
//! ## Features
//!
//! - **Client**: namespaced counters, gauges and timings, tags and sample rates,
//!   timings that are reported even when the measured block fails
//! - **Server Aggregation**: lock-free counter table drained on a fixed interval,
//!   gauges as last value, timings summarized from an HDR histogram
//! - **Forwarding**: every received datagram relayed verbatim to an upstream collector
//! - **Flush Writers**: `tracing` log lines, upstream StatsD packets or a custom writer
//!
//! ## Quick Start
//!
//! ```no_run
//! use rylv_statsd::{increment, gauge, timing};
//! use rylv_statsd::{MetricSenderTrait, Server, StatsdClient, StatsdOptions};
//!
//! let options = StatsdOptions {
//!     namespace: "myapp".to_string(),
//!     ..StatsdOptions::default()
//! };
//!
//! let mut server = Server::new(options).expect("upstreams should resolve");
//! server.start().expect("listener should bind");
//!
//! let client = StatsdClient::new(server.options()).expect("address should resolve");
//! increment!(client, "requests", "endpoint" => "api");
//! gauge!(client, "connections.active", 100, "pool" => "main");
//! let rows = timing!(client, "db.query", || 42);
//! assert_eq!(rows, 42);
//!
//! // final flush of everything aggregated so far
//! server.stop();
//! ```

// #![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
//#![deny(clippy::unreachable)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![warn(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

// https://docs.datadoghq.com/developers/dogstatsd/datagram_shell/?tab=metrics
mod dogstats;
mod error;

pub use dogstats::client::{MetricSenderTrait, StatsdClient, TimingGuard};
pub use dogstats::codec::{decode, decode_datagram, encode, encode_into, DecodedMetric};
pub use dogstats::instrument::instrument_job;
pub use dogstats::server::{Server, ServerState, ServerStats, StatsdOptions};
pub use dogstats::writer::{
    FlushWriterTrait, FlushWriterType, LogFlushWriter, StatsdFlushWriter, UdpSocketWriter, Writer,
};
pub use dogstats::{
    Aggregator, MetricType, SampleRate, SigFig, Snapshot, Tag, TimingSummary,
};
pub use error::MetricsError;

/// Result type for metric operations.
///
/// Wraps errors that can occur while encoding, receiving and transmitting metrics.
pub type MetricResult<T> = Result<T, MetricsError>;

/// Hasher used by the aggregation maps unless another one is supplied.
pub type DefaultMetricHasher = std::hash::RandomState;
