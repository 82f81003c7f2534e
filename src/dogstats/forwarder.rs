use tracing::error;

use super::writer::{UdpSocketWriter, Writer};
use crate::MetricResult;

/// Relays received datagrams, byte for byte, to an upstream collector.
pub struct Forwarder<W = UdpSocketWriter> {
    writer: W,
}

impl Forwarder<UdpSocketWriter> {
    /// Resolves the upstream address and binds the forwarding socket.
    pub fn connect(host: &str, port: u16) -> MetricResult<Self> {
        Ok(Self::new(UdpSocketWriter::connect(host, port)?))
    }
}

impl<W: Writer> Forwarder<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Sends `payload` upstream. Failures are logged and reported as `false`.
    pub fn forward(&self, payload: &[u8]) -> bool {
        match self.writer.write(payload) {
            Ok(_) => true,
            Err(err) => {
                error!("Forwarding error: {err}");
                false
            }
        }
    }
}
