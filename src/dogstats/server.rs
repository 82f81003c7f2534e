use std::mem;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{unbounded, Sender};
use tracing::{debug, error, info, warn};

use super::aggregator::SigFig;
use super::forwarder::Forwarder;
use super::job::run_flush_job;
use super::listener::{run_listener, MessageHandler};
use super::net::{bind_listener, MAX_UDP_PAYLOAD};
use super::writer::{FlushWriterHolder, FlushWriterType};
use super::Aggregator;
use crate::{DefaultMetricHasher, MetricResult};

/// Configuration shared by [`Server`] and [`crate::StatsdClient`].
#[derive(Debug)]
pub struct StatsdOptions {
    /// Listener bind host for the server, destination host for the client.
    pub host: String,
    /// Listener bind port for the server, destination port for the client.
    pub port: u16,
    /// Prefix the client prepends to every metric name. Empty means no prefix.
    pub namespace: String,
    /// Aggregate received metrics and flush them periodically. When disabled
    /// every received metric is logged instead.
    pub aggregation: bool,
    /// Upstream host received datagrams are relayed to.
    pub forward_host: Option<String>,
    /// Upstream port. Forwarding is enabled only when both host and port are set.
    pub forward_port: Option<u16>,
    /// Interval between two flushes of the aggregator.
    pub flush_interval: Duration,
    /// Upper bound on how long the listener takes to notice a stop request.
    pub poll_interval: Duration,
    /// Requested `SO_RCVBUF` for the listener socket. Zero keeps the OS default.
    pub recv_buffer_size: usize,
    /// Size of the receive buffer, capped at the largest UDP payload.
    /// Datagrams that fill a smaller buffer may have been cut short and are
    /// logged and counted in [`ServerStats::truncated`].
    pub max_packet_size: usize,
    /// Precision of the timing histograms.
    pub timing_sig_fig: SigFig,
    /// Where aggregated values go on every flush.
    pub flush_writer: FlushWriterType,
}

impl Default for StatsdOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8125,
            namespace: "app".to_string(),
            aggregation: true,
            forward_host: None,
            forward_port: None,
            flush_interval: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            recv_buffer_size: 1 << 20,
            max_packet_size: MAX_UDP_PAYLOAD,
            timing_sig_fig: SigFig::default(),
            flush_writer: FlushWriterType::Log,
        }
    }
}

impl StatsdOptions {
    /// Whether received datagrams are relayed upstream.
    #[must_use]
    pub const fn forwarding_enabled(&self) -> bool {
        self.forward_host.is_some() && self.forward_port.is_some()
    }
}

/// Lifecycle of a [`Server`].
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServerState {
    /// Not listening. Initial and final state.
    Stopped = 0,
    /// Binding the listener and spawning threads.
    Starting = 1,
    /// Listening and flushing.
    Running = 2,
    /// Stop requested, threads are winding down.
    ShuttingDown = 3,
}

impl ServerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

/// Counters describing what the listener has seen since the server was created.
#[derive(Debug, Default)]
pub struct ServerStats {
    received: AtomicU64,
    decoded: AtomicU64,
    malformed: AtomicU64,
    forwarded: AtomicU64,
    forward_errors: AtomicU64,
    truncated: AtomicU64,
}

impl ServerStats {
    /// Datagrams received.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Metric lines decoded successfully.
    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    /// Lines or datagrams that failed to decode.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Datagrams relayed upstream.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Datagrams that could not be relayed.
    pub fn forward_errors(&self) -> u64 {
        self.forward_errors.load(Ordering::Relaxed)
    }

    /// Datagrams that filled the receive buffer and may have lost their tail.
    pub fn truncated(&self) -> u64 {
        self.truncated.load(Ordering::Relaxed)
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forward_error(&self) {
        self.forward_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncated(&self) {
        self.truncated.fetch_add(1, Ordering::Relaxed);
    }
}

/// A UDP StatsD server.
///
/// Owns the listener thread and, when aggregation is enabled, the flush
/// thread. Both are started by [`Server::start`] and joined by
/// [`Server::stop`], which also runs a final flush. Dropping a running
/// server stops it.
///
/// # Example
///
/// ```no_run
/// use rylv_statsd::{Server, ServerState, StatsdOptions};
///
/// let mut server = Server::new(StatsdOptions::default()).unwrap();
/// server.start().unwrap();
/// assert_eq!(server.state(), ServerState::Running);
/// server.stop();
/// ```
pub struct Server {
    options: StatsdOptions,
    aggregator: Arc<Aggregator>,
    forwarder: Option<Arc<Forwarder>>,
    stats: Arc<ServerStats>,
    state: AtomicU8,
    shutdown: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,

    // moved into the flush thread while running and handed back on stop
    flush_writer: Option<FlushWriterHolder>,
    flush_sender: Option<Sender<()>>,
    flush_handle: Option<JoinHandle<FlushWriterHolder>>,
    listener_handle: Option<JoinHandle<()>>,
}

impl Server {
    /// Creates a stopped server.
    ///
    /// Resolves the upstream of the flush writer and of the forwarder, so
    /// configuration errors surface here rather than on the first flush.
    ///
    /// # Errors
    /// Returns [`crate::MetricsError::Resolve`] if an upstream address does not
    /// resolve and [`crate::MetricsError::StdIo`] if a sending socket cannot be bound.
    pub fn new(mut options: StatsdOptions) -> MetricResult<Self> {
        let flush_writer = FlushWriterHolder::new(mem::take(&mut options.flush_writer))?;

        let forwarder = match (&options.forward_host, options.forward_port) {
            (Some(host), Some(port)) => Some(Arc::new(Forwarder::connect(host, port)?)),
            _ => None,
        };

        let aggregator =
            Aggregator::with_hasher_builder(DefaultMetricHasher::default(), options.timing_sig_fig);

        Ok(Self {
            options,
            aggregator: Arc::new(aggregator),
            forwarder,
            stats: Arc::new(ServerStats::default()),
            state: AtomicU8::new(ServerState::Stopped as u8),
            shutdown: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            flush_writer: Some(flush_writer),
            flush_sender: None,
            flush_handle: None,
            listener_handle: None,
        })
    }

    /// Binds the listener and starts the listener and flush threads.
    ///
    /// Starting a server that is not stopped does nothing.
    ///
    /// # Errors
    /// Returns [`crate::MetricsError::Bind`] if the port cannot be bound. The
    /// server stays stopped and the caller may retry.
    pub fn start(&mut self) -> MetricResult<()> {
        if self
            .state
            .compare_exchange(
                ServerState::Stopped as u8,
                ServerState::Starting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!("Server already started, ignoring start request");
            return Ok(());
        }

        match self.spawn_threads() {
            Ok(addr) => {
                self.set_state(ServerState::Running);
                info!(
                    "UDP StatsD listener started on {addr} (aggregation={}, forwarding={})",
                    self.options.aggregation,
                    self.options.forwarding_enabled()
                );
                Ok(())
            }
            Err(err) => {
                self.set_state(ServerState::Stopped);
                warn!(
                    "StatsD server could not start on {}:{}: {err}",
                    self.options.host, self.options.port
                );
                Err(err)
            }
        }
    }

    fn spawn_threads(&mut self) -> MetricResult<SocketAddr> {
        let socket = bind_listener(
            &self.options.host,
            self.options.port,
            self.options.recv_buffer_size,
            self.options.poll_interval,
        )?;
        let addr = socket.local_addr()?;
        self.local_addr = Some(addr);
        self.shutdown.store(false, Ordering::Release);

        if self.options.aggregation {
            let flush_writer = self.flush_writer.take().map_or_else(
                || FlushWriterHolder::new(FlushWriterType::Log),
                Ok,
            )?;
            let (sender, receiver) = unbounded::<()>();
            let aggregator = Arc::clone(&self.aggregator);
            let flush_interval = self.options.flush_interval;
            self.flush_handle = Some(std::thread::spawn(move || {
                run_flush_job(aggregator, flush_writer, flush_interval, &receiver)
            }));
            self.flush_sender = Some(sender);
        }

        let handler = MessageHandler::new(
            self.options.aggregation.then(|| Arc::clone(&self.aggregator)),
            self.forwarder.clone(),
            Arc::clone(&self.stats),
        );
        let shutdown = Arc::clone(&self.shutdown);
        let max_packet_size = self.options.max_packet_size;
        let poll_interval = self.options.poll_interval;
        self.listener_handle = Some(std::thread::spawn(move || {
            run_listener(socket, &handler, &shutdown, max_packet_size, poll_interval);
        }));

        Ok(addr)
    }

    /// Stops the listener, runs a final flush and joins both threads.
    ///
    /// Stopping a server that is not running does nothing.
    pub fn stop(&mut self) {
        let state = self.state();
        if matches!(state, ServerState::Stopped | ServerState::ShuttingDown) {
            return;
        }

        self.set_state(ServerState::ShuttingDown);
        self.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.listener_handle.take() {
            if handle.join().is_err() {
                error!("Listener thread panicked");
            }
        }

        // disconnecting the channel wakes the flush job for its final flush
        drop(self.flush_sender.take());
        if let Some(handle) = self.flush_handle.take() {
            match handle.join() {
                Ok(flush_writer) => self.flush_writer = Some(flush_writer),
                Err(_) => error!("Flush thread panicked"),
            }
        }

        self.local_addr = None;
        self.set_state(ServerState::Stopped);
        info!("StatsD listener stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Address the listener is bound to while running. Useful with port 0.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Ingestion counters.
    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// The counter table the listener feeds.
    #[must_use]
    pub const fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Configuration this server was created with.
    #[must_use]
    pub const fn options(&self) -> &StatsdOptions {
        &self.options
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
