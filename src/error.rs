use hdrhistogram::errors::{CreationError, RecordError};
use rustix::io::Errno;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors that can occur while encoding, receiving, aggregating or forwarding metrics.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A custom error with a free-form message.
    #[error("Custom error: {0}")]
    Custom(String),

    /// The listener socket could not be bound, usually because another
    /// instance already listens on the address.
    #[error("Bind error on {addr}: {source}")]
    Bind {
        /// Address the server tried to bind.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// A wire line could not be decoded.
    #[error("Malformed metric {line:?}: {reason}")]
    MalformedMetric {
        /// The offending line, lossily converted to UTF-8.
        line: String,
        /// Short description of what is wrong with the line.
        reason: &'static str,
    },

    /// A UDP datagram could not be sent.
    #[error("Send error to {destination}: {source}")]
    Send {
        /// Destination of the datagram.
        destination: SocketAddr,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// A `host:port` pair did not resolve to any socket address.
    #[error("Could not resolve address {addr}")]
    Resolve {
        /// The unresolved `host:port`.
        addr: String,
    },

    /// Sample rates must be in `(0, 1]`.
    #[error("Invalid sample rate {0}: must be in (0, 1]")]
    InvalidSampleRate(f64),

    /// An I/O error from the standard library.
    #[error("Std Io error: {0}")]
    StdIo(#[from] std::io::Error),

    /// A low-level system errno.
    #[error("Errno error: {0}")]
    Errno(#[from] Errno),

    /// Failed to record a value into a timing histogram.
    #[error("Histogram record error: {0}")]
    Histogram(#[from] RecordError),

    /// Failed to create a timing histogram.
    #[error("Histogram creation error: {0}")]
    HistogramCreation(#[from] CreationError),
}

impl MetricsError {
    pub(crate) fn malformed(line: &str, reason: &'static str) -> Self {
        Self::MalformedMetric {
            line: line.to_owned(),
            reason,
        }
    }
}

impl From<String> for MetricsError {
    fn from(value: String) -> Self {
        Self::Custom(value)
    }
}

impl From<&str> for MetricsError {
    fn from(value: &str) -> Self {
        Self::Custom(value.to_string())
    }
}
