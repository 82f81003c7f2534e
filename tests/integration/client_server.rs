use crate::support::{client_options, test_options, wait_until, CaptureWriter};
use rylv_statsd::{
    instrument_job, MetricSenderTrait, SampleRate, Server, StatsdClient, StatsdOptions,
};
use std::net::UdpSocket;
use std::time::Duration;

fn running_server(options: StatsdOptions) -> (Server, u16) {
    let mut server = Server::new(options).unwrap();
    server.start().unwrap();
    let port = server.local_addr().unwrap().port();
    (server, port)
}

#[test]
fn test_counters_are_summed_until_flush() {
    let capture = CaptureWriter::default();
    let (mut server, port) = running_server(test_options(&capture));
    let client = StatsdClient::new(&client_options(port)).unwrap();

    for _ in 0..3 {
        client.increment("test.metric", 1, &[], SampleRate::ONE);
    }
    assert!(wait_until(|| server.stats().received() == 3));

    server.stop();
    assert_eq!(capture.flushed(), vec!["app.test.metric:3|c"]);
}

#[test]
fn test_gauges_and_timings_are_summarized() {
    let capture = CaptureWriter::default();
    let (mut server, port) = running_server(test_options(&capture));
    let client = StatsdClient::new(&client_options(port)).unwrap();

    client.gauge("queue.depth", 4, &[], SampleRate::ONE);
    client.gauge("queue.depth", 9, &[("queue", "mail")], SampleRate::ONE);
    client.timing_value("db.query", 20, &[], SampleRate::ONE);
    client.timing_value("db.query", 40, &[], SampleRate::ONE);
    assert!(wait_until(|| server.stats().received() == 4));

    server.stop();
    assert_eq!(
        capture.flushed(),
        vec![
            "app.queue.depth:9|g",
            "app.db.query.count:2|c",
            "app.db.query.min:20|g",
            "app.db.query.max:40|g",
            "app.db.query.p50:20|g",
            "app.db.query.p99:40|g",
        ]
    );
}

#[test]
fn test_multi_line_datagram() {
    let capture = CaptureWriter::default();
    let (mut server, port) = running_server(test_options(&capture));

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender
        .send_to(b"app.a:1|c\napp.a:2|c\n\napp.b:5|g", ("127.0.0.1", port))
        .unwrap();
    assert!(wait_until(|| server.stats().decoded() == 3));

    server.stop();
    assert_eq!(capture.flushed(), vec!["app.a:3|c", "app.b:5|g"]);
}

#[test]
fn test_malformed_datagram_keeps_server_running() {
    let capture = CaptureWriter::default();
    let (mut server, port) = running_server(test_options(&capture));

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(b"bad_metric", ("127.0.0.1", port)).unwrap();
    assert!(wait_until(|| server.stats().malformed() == 1));

    sender.send_to(b"app.ok:1|c", ("127.0.0.1", port)).unwrap();
    assert!(wait_until(|| server.stats().decoded() == 1));

    server.stop();
    assert_eq!(server.stats().received(), 2);
    assert_eq!(capture.flushed(), vec!["app.ok:1|c"]);
}

#[test]
fn test_without_aggregation_nothing_is_flushed() {
    let capture = CaptureWriter::default();
    let options = StatsdOptions {
        aggregation: false,
        ..test_options(&capture)
    };
    let (mut server, port) = running_server(options);
    let client = StatsdClient::new(&client_options(port)).unwrap();

    client.increment("hits", 1, &[], SampleRate::ONE);
    assert!(wait_until(|| server.stats().decoded() == 1));

    server.stop();
    assert!(capture.flushed().is_empty());
    assert_eq!(server.aggregator().tracked_metrics(), 0);
}

#[test]
fn test_periodic_flush() {
    let capture = CaptureWriter::default();
    let options = StatsdOptions {
        flush_interval: Duration::from_millis(20),
        ..test_options(&capture)
    };
    let (mut server, port) = running_server(options);
    let client = StatsdClient::new(&client_options(port)).unwrap();

    client.increment("ticks", 2, &[], SampleRate::ONE);
    assert!(wait_until(|| !capture.flushed().is_empty()));

    server.stop();
    assert_eq!(capture.flushed(), vec!["app.ticks:2|c"]);
}

#[test]
fn test_job_instrumentation_end_to_end() {
    let capture = CaptureWriter::default();
    let (mut server, port) = running_server(test_options(&capture));
    let client = StatsdClient::new(&client_options(port)).unwrap();

    let ok: Result<u8, String> = instrument_job(&client, "InvoiceMailer", || Ok(1));
    let failed: Result<u8, String> =
        instrument_job(&client, "InvoiceMailer", || Err("smtp down".to_string()));
    assert_eq!(ok, Ok(1));
    assert_eq!(failed, Err("smtp down".to_string()));
    assert!(wait_until(|| server.stats().received() == 4));

    server.stop();
    let flushed = capture.flushed();
    assert!(flushed.contains(&"app.jobs.processed:1|c".to_string()));
    assert!(flushed.contains(&"app.jobs.failed:1|c".to_string()));
    assert!(flushed.contains(&"app.jobs.invoice_mailer.perform.count:2|c".to_string()));
}
