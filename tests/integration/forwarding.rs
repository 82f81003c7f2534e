use crate::support::{test_options, wait_until, CaptureWriter};
use rylv_statsd::{Server, StatsdOptions};
use std::collections::HashSet;
use std::net::UdpSocket;
use std::time::Duration;

/// Binds an upstream collector on an ephemeral port
fn upstream() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("couldn't bind upstream");
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set_read_timeout failed");
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

fn receive_exact(socket: &UdpSocket, expected_count: usize) -> HashSet<Vec<u8>> {
    let mut buf = vec![0; 65_535];
    let mut received = HashSet::new();
    for _ in 0..expected_count {
        let (len, _) = socket.recv_from(&mut buf).expect("Expected udp message");
        received.insert(buf[..len].to_vec());
    }
    received
}

fn forwarding_server(aggregation: bool, capture: &CaptureWriter, upstream_port: u16) -> Server {
    let options = StatsdOptions {
        aggregation,
        forward_host: Some("127.0.0.1".to_string()),
        forward_port: Some(upstream_port),
        ..test_options(capture)
    };
    let mut server = Server::new(options).unwrap();
    server.start().unwrap();
    server
}

#[test]
fn test_datagrams_are_forwarded_verbatim() {
    let (upstream, upstream_port) = upstream();
    let capture = CaptureWriter::default();
    let mut server = forwarding_server(true, &capture, upstream_port);
    let port = server.local_addr().unwrap().port();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let tagged: &[u8] = b"app.hits:1|c|@0.5|#region:eu";
    let malformed: &[u8] = b"bad_metric";
    sender.send_to(tagged, ("127.0.0.1", port)).unwrap();
    sender.send_to(malformed, ("127.0.0.1", port)).unwrap();

    let received = receive_exact(&upstream, 2);
    assert!(received.contains(tagged));
    assert!(received.contains(malformed));

    assert!(wait_until(|| server.stats().forwarded() == 2));
    server.stop();
    // forwarding does not bypass aggregation
    assert_eq!(capture.flushed(), vec!["app.hits:1|c"]);
}

#[test]
fn test_large_datagram_is_forwarded_and_aggregated_whole() {
    let (upstream, upstream_port) = upstream();
    let capture = CaptureWriter::default();
    let mut server = forwarding_server(true, &capture, upstream_port);
    let port = server.local_addr().unwrap().port();

    let payload: String = (0..700).map(|i| format!("app.m{i}:1|c\n")).collect();
    assert!(payload.len() > 8192);
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(payload.as_bytes(), ("127.0.0.1", port)).unwrap();

    let received = receive_exact(&upstream, 1);
    assert!(received.contains(payload.as_bytes()));

    assert!(wait_until(|| server.stats().decoded() == 700));
    server.stop();
    assert_eq!(server.stats().malformed(), 0);
    assert_eq!(server.stats().truncated(), 0);
    assert_eq!(capture.flushed().len(), 700);
}

#[test]
fn test_forwarding_without_aggregation() {
    let (upstream, upstream_port) = upstream();
    let capture = CaptureWriter::default();
    let mut server = forwarding_server(false, &capture, upstream_port);
    let port = server.local_addr().unwrap().port();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(b"app.a:1|c\napp.b:2|g", ("127.0.0.1", port)).unwrap();

    let received = receive_exact(&upstream, 1);
    assert!(received.contains(b"app.a:1|c\napp.b:2|g".as_slice()));

    server.stop();
    assert!(capture.flushed().is_empty());
}

#[test]
fn test_unresolvable_forward_host_fails_construction() {
    let options = StatsdOptions {
        forward_host: Some("invalid host name".to_string()),
        forward_port: Some(8125),
        ..StatsdOptions::default()
    };
    assert!(Server::new(options).is_err());
}
