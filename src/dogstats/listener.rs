use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::codec::{decode_datagram, DecodedMetric};
use super::forwarder::Forwarder;
use super::net::MAX_UDP_PAYLOAD;
use super::server::ServerStats;
use super::{Aggregator, MetricType};

/// Routes every received datagram to the aggregator and the forwarder.
pub struct MessageHandler {
    aggregator: Option<Arc<Aggregator>>,
    forwarder: Option<Arc<Forwarder>>,
    stats: Arc<ServerStats>,
}

impl MessageHandler {
    /// `aggregator` is `None` when aggregation is disabled, in which case
    /// every decoded metric is logged instead.
    pub const fn new(
        aggregator: Option<Arc<Aggregator>>,
        forwarder: Option<Arc<Forwarder>>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            aggregator,
            forwarder,
            stats,
        }
    }

    /// Handles one datagram. Never fails: malformed lines are logged and counted.
    pub fn handle(&self, payload: &[u8]) {
        self.stats.record_received();

        match decode_datagram(payload) {
            Ok(metrics) => {
                for metric in metrics {
                    match metric {
                        Ok(metric) => self.process(&metric),
                        Err(err) => {
                            self.stats.record_malformed();
                            error!("Failed to parse metric: {err}");
                        }
                    }
                }
            }
            Err(err) => {
                self.stats.record_malformed();
                error!("Failed to parse datagram: {err}");
            }
        }

        // raw bytes go upstream whether or not they decoded
        if let Some(forwarder) = &self.forwarder {
            if forwarder.forward(payload) {
                self.stats.record_forwarded();
            } else {
                self.stats.record_forward_error();
            }
        }
    }

    fn process(&self, metric: &DecodedMetric<'_>) {
        self.stats.record_decoded();

        let Some(aggregator) = &self.aggregator else {
            info!(
                "Metric received (no aggregation) - {}:{}|{}",
                metric.name, metric.value, metric.metric_type
            );
            return;
        };

        match metric.metric_type {
            MetricType::Count => aggregator.increment(metric.name, metric.value),
            MetricType::Gauge => aggregator.set_gauge(metric.name, metric.value),
            MetricType::Timing => {
                if let Err(err) = aggregator.record_timing(metric.name, metric.value) {
                    warn!("Dropping timing {}: {err}", metric.name);
                }
            }
        }
    }
}

/// Receives datagrams until `shutdown` is raised.
///
/// The socket's read timeout bounds how long a raised flag goes unnoticed.
/// The socket is closed when this returns. `max_packet_size` is capped at the
/// largest UDP payload; a datagram that fills a smaller buffer is still
/// handled but logged and counted as possibly truncated.
pub fn run_listener(
    socket: UdpSocket,
    handler: &MessageHandler,
    shutdown: &AtomicBool,
    max_packet_size: usize,
    poll_interval: Duration,
) {
    let mut buf = vec![0; max_packet_size.clamp(1, MAX_UDP_PAYLOAD)];

    while !shutdown.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                debug!("UDP packet received from {peer}: {len} bytes");
                if len == buf.len() && len < MAX_UDP_PAYLOAD {
                    handler.stats.record_truncated();
                    warn!("UDP packet from {peer} filled the {len} byte buffer and may be truncated");
                }
                handler.handle(&buf[..len]);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(err) => {
                error!("Listener error: {err}");
                // avoid spinning on a persistent socket error
                std::thread::sleep(poll_interval);
            }
        }
    }

    debug!("Listener loop exited");
}
