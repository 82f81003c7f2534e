use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::warn;

use crate::{MetricResult, MetricsError};

/// Largest payload a UDP datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_535;

// zero would disable the timeout and block recv forever
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Resolves `host:port` to the first socket address it maps to.
pub fn resolve(host: &str, port: u16) -> MetricResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| MetricsError::Resolve {
            addr: format!("{host}:{port}"),
        })
}

/// Ephemeral local address of the same family as `destination`.
pub const fn unspecified_for(destination: SocketAddr) -> SocketAddr {
    match destination {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

/// Binds the listener socket.
///
/// `recv` on the returned socket waits at most `poll_interval`. Failing to
/// grow the receive buffer only logs a warning.
pub fn bind_listener(
    host: &str,
    port: u16,
    recv_buffer_size: usize,
    poll_interval: Duration,
) -> MetricResult<UdpSocket> {
    let addr = resolve(host, port)?;
    let socket = UdpSocket::bind(addr).map_err(|source| MetricsError::Bind {
        addr: addr.to_string(),
        source,
    })?;

    if recv_buffer_size > 0 {
        if let Err(err) = set_recv_buffer_size(&socket, recv_buffer_size) {
            warn!("Could not set SO_RCVBUF to {recv_buffer_size}: {err}");
        }
    }

    socket.set_read_timeout(Some(poll_interval.max(MIN_POLL_INTERVAL)))?;
    Ok(socket)
}

#[cfg(unix)]
fn set_recv_buffer_size(socket: &UdpSocket, size: usize) -> MetricResult<()> {
    rustix::net::sockopt::set_socket_recv_buffer_size(socket, size).map_err(Into::into)
}

#[cfg(not(unix))]
fn set_recv_buffer_size(_socket: &UdpSocket, _size: usize) -> MetricResult<()> {
    Ok(())
}
