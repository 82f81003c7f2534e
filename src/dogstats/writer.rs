use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use tracing::info;

use super::net::{resolve, unspecified_for};
use super::MetricType;
use crate::{MetricResult, MetricsError};

/// A datagram sink.
///
/// The client and the forwarder write whole datagrams through this seam;
/// [`UdpSocketWriter`] is the production implementation.
pub trait Writer {
    /// Sends `buf` as one datagram.
    ///
    /// # Errors
    /// Returns [`MetricsError::Send`] when the datagram could not be sent.
    fn write(&self, buf: &[u8]) -> MetricResult<usize>;
}

impl<T> Writer for &T
where
    T: Writer,
{
    fn write(&self, buf: &[u8]) -> MetricResult<usize> {
        (*self).write(buf)
    }
}

impl<T> Writer for Arc<T>
where
    T: Writer,
{
    fn write(&self, buf: &[u8]) -> MetricResult<usize> {
        self.as_ref().write(buf)
    }
}

/// Sends datagrams to a fixed destination from an ephemeral local port.
#[derive(Debug)]
pub struct UdpSocketWriter {
    sock: UdpSocket,
    destination_addr: SocketAddr,
}

impl UdpSocketWriter {
    /// Binds an ephemeral socket of the destination's address family.
    ///
    /// # Errors
    /// Returns [`MetricsError::StdIo`] if the local socket cannot be bound.
    pub fn new(destination_addr: SocketAddr) -> MetricResult<Self> {
        let sock = UdpSocket::bind(unspecified_for(destination_addr))?;
        Ok(Self {
            sock,
            destination_addr,
        })
    }

    /// Resolves `host:port` and binds an ephemeral socket for it.
    ///
    /// # Errors
    /// Returns [`MetricsError::Resolve`] if the address does not resolve and
    /// [`MetricsError::StdIo`] if the local socket cannot be bound.
    pub fn connect(host: &str, port: u16) -> MetricResult<Self> {
        Self::new(resolve(host, port)?)
    }

    /// The address datagrams are sent to.
    #[must_use]
    pub const fn destination(&self) -> SocketAddr {
        self.destination_addr
    }
}

impl Writer for UdpSocketWriter {
    fn write(&self, buf: &[u8]) -> MetricResult<usize> {
        self.sock
            .send_to(buf, self.destination_addr)
            .map_err(|source| MetricsError::Send {
                destination: self.destination_addr,
                source,
            })
    }
}

/// Trait for implementing flush writers.
///
/// The flush job hands every aggregated value of a window to a flush writer,
/// then calls [`flush`](FlushWriterTrait::flush) once. Implement it to send
/// aggregates to a custom destination.
pub trait FlushWriterTrait {
    /// Writes one aggregated value.
    ///
    /// `metric` holds the parts of the metric name, to be concatenated
    /// (e.g. `["db.query", ".p99"]`).
    ///
    /// # Errors
    /// Returns `MetricResult::Err` if the value cannot be written.
    fn write(&mut self, metric: &[&str], value: &str, metric_type: MetricType)
        -> MetricResult<()>;

    /// Flushes what was written since the previous flush and returns the
    /// number of bytes or records emitted.
    ///
    /// # Errors
    /// Returns `MetricResult::Err` on I/O failure.
    fn flush(&mut self) -> MetricResult<usize>;

    /// Resets the writer state, clearing any internal buffers.
    fn reset(&mut self);
}

/// Specifies where aggregated values go on every flush.
#[derive(Default)]
pub enum FlushWriterType {
    /// One `tracing` info record per value: `Aggregated metric - <metric>: <value>`.
    #[default]
    Log,
    /// StatsD lines batched into packets sent to an upstream collector.
    Statsd {
        /// Upstream host.
        host: String,
        /// Upstream port.
        port: u16,
        /// Prefix prepended verbatim to every metric name.
        prefix: String,
        /// Maximum size of a single packet in bytes. Recommended: 1432 for safe MTU.
        max_packet_size: u16,
    },
    /// User-provided writer implementation.
    Custom(Box<dyn FlushWriterTrait + Send + 'static>),
}

impl std::fmt::Debug for FlushWriterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "Log"),
            Self::Statsd {
                host,
                port,
                prefix,
                max_packet_size,
            } => f
                .debug_struct("Statsd")
                .field("host", host)
                .field("port", port)
                .field("prefix", prefix)
                .field("max_packet_size", max_packet_size)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(...)"),
        }
    }
}

pub struct FlushWriterHolder {
    writer: Box<dyn FlushWriterTrait + Send>,
}

impl FlushWriterHolder {
    pub fn new(writer_type: FlushWriterType) -> MetricResult<Self> {
        let writer = match writer_type {
            FlushWriterType::Log => Box::new(LogFlushWriter::new()) as Box<dyn FlushWriterTrait + Send>,
            FlushWriterType::Statsd {
                host,
                port,
                prefix,
                max_packet_size,
            } => Box::new(StatsdFlushWriter::new(
                UdpSocketWriter::connect(&host, port)?,
                prefix,
                max_packet_size,
            )) as Box<dyn FlushWriterTrait + Send>,
            FlushWriterType::Custom(writer) => writer,
        };

        Ok(Self { writer })
    }

    pub fn acquire(&mut self) -> FlushGuard<'_> {
        FlushGuard {
            writer: self.writer.as_mut(),
        }
    }
}

/// Borrow of the flush writer for one flush; resets the writer when dropped.
pub struct FlushGuard<'a> {
    writer: &'a mut (dyn FlushWriterTrait + Send),
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.writer.reset();
    }
}

impl FlushWriterTrait for FlushGuard<'_> {
    fn write(&mut self, metric: &[&str], value: &str, metric_type: MetricType) -> MetricResult<()> {
        self.writer.write(metric, value, metric_type)
    }

    fn flush(&mut self) -> MetricResult<usize> {
        self.writer.flush()
    }

    fn reset(&mut self) {
        self.writer.reset();
    }
}

/// Emits every aggregated value as a `tracing` info record.
#[derive(Debug, Default)]
pub struct LogFlushWriter {
    name: String,
    pending: usize,
}

impl LogFlushWriter {
    /// Creates a log flush writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlushWriterTrait for LogFlushWriter {
    fn write(&mut self, metric: &[&str], value: &str, _metric_type: MetricType) -> MetricResult<()> {
        self.name.clear();
        for part in metric {
            self.name.push_str(part);
        }
        info!("Aggregated metric - {}: {value}", self.name);
        self.pending += 1;
        Ok(())
    }

    fn flush(&mut self) -> MetricResult<usize> {
        Ok(std::mem::take(&mut self.pending))
    }

    fn reset(&mut self) {
        self.name.clear();
        self.pending = 0;
    }
}

/// Writes aggregates as StatsD lines, packing as many `\n`-terminated lines
/// per datagram as `max_packet_size` allows.
pub struct StatsdFlushWriter<T> {
    max_packet_size: u16,
    writer: T,
    prefix: String,
    current_transmit: String,
}

impl<T: Writer> StatsdFlushWriter<T> {
    /// Creates a writer sending packets through `writer`.
    pub fn new(writer: T, prefix: String, max_packet_size: u16) -> Self {
        Self {
            max_packet_size,
            writer,
            prefix,
            current_transmit: String::with_capacity(max_packet_size as usize),
        }
    }

    fn flush_current_transmit(&mut self) -> MetricResult<usize> {
        if !self.current_transmit.is_empty() {
            let result = self.writer.write(self.current_transmit.as_bytes())?;
            // only flush when no error occurs
            self.current_transmit.clear();
            return Ok(result);
        }
        Ok(0)
    }
}

#[inline]
fn line_len(prefix: &str, metric: &[&str], value: &str, metric_type: &str) -> usize {
    // format!("{}{}:{}|{}\n", prefix, metric, value, metric_type)
    let mut len = prefix.len() + value.len() + metric_type.len() + 3; // ':' + '|' + '\n'
    for part in metric {
        len += part.len();
    }
    len
}

impl<T: Writer> FlushWriterTrait for StatsdFlushWriter<T> {
    fn write(&mut self, metric: &[&str], value: &str, metric_type: MetricType) -> MetricResult<()> {
        let metric_type = metric_type.as_str();
        let len = line_len(self.prefix.as_str(), metric, value, metric_type);

        if len > self.max_packet_size as usize {
            return Err(format!("Metric is larger than {}", self.max_packet_size).into());
        }

        if self.current_transmit.len() + len > self.max_packet_size as usize {
            self.flush_current_transmit()?;
        }

        self.current_transmit.push_str(self.prefix.as_str());
        for part in metric {
            self.current_transmit.push_str(part);
        }
        self.current_transmit.push(':');
        self.current_transmit.push_str(value);
        self.current_transmit.push('|');
        self.current_transmit.push_str(metric_type);
        self.current_transmit.push('\n');

        Ok(())
    }

    fn flush(&mut self) -> MetricResult<usize> {
        self.flush_current_transmit()
    }

    fn reset(&mut self) {
        self.current_transmit.clear();
    }
}
