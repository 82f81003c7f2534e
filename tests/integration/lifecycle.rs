use crate::support::{client_options, test_options, wait_until, CaptureWriter};
use rylv_statsd::{
    MetricSenderTrait, MetricsError, SampleRate, Server, ServerState, StatsdClient,
};
use std::time::{Duration, Instant};

#[test]
fn test_bind_conflict_aborts_second_server() {
    let first_capture = CaptureWriter::default();
    let mut first = Server::new(test_options(&first_capture)).unwrap();
    first.start().unwrap();
    let port = first.local_addr().unwrap().port();

    let second_capture = CaptureWriter::default();
    let mut options = test_options(&second_capture);
    options.port = port;
    let mut second = Server::new(options).unwrap();

    let result = second.start();
    assert!(matches!(result, Err(MetricsError::Bind { .. })));
    assert_eq!(second.state(), ServerState::Stopped);

    // the first server keeps serving
    let client = StatsdClient::new(&client_options(port)).unwrap();
    client.increment("still.up", 1, &[], SampleRate::ONE);
    assert!(wait_until(|| first.stats().received() == 1));
    assert_eq!(first.state(), ServerState::Running);
    first.stop();
    assert_eq!(first_capture.flushed(), vec!["app.still.up:1|c"]);
}

#[test]
fn test_stop_is_prompt() {
    let capture = CaptureWriter::default();
    let mut server = Server::new(test_options(&capture)).unwrap();
    server.start().unwrap();
    let port = server.local_addr().unwrap().port();

    let started = Instant::now();
    server.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.state(), ServerState::Stopped);

    // nothing is processed once stop has returned
    let client = StatsdClient::new(&client_options(port)).unwrap();
    client.increment("late", 1, &[], SampleRate::ONE);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(server.stats().received(), 0);
    assert!(capture.flushed().is_empty());
}

#[test]
fn test_drop_flushes_running_server() {
    let capture = CaptureWriter::default();
    {
        let mut server = Server::new(test_options(&capture)).unwrap();
        server.start().unwrap();
        let port = server.local_addr().unwrap().port();

        let client = StatsdClient::new(&client_options(port)).unwrap();
        client.increment("dropped", 7, &[], SampleRate::ONE);
        assert!(wait_until(|| server.stats().received() == 1));
    }
    assert_eq!(capture.flushed(), vec!["app.dropped:7|c"]);
}

#[test]
fn test_restart_keeps_flush_writer() {
    let capture = CaptureWriter::default();
    let mut server = Server::new(test_options(&capture)).unwrap();

    for round in 1..=2 {
        server.start().unwrap();
        let port = server.local_addr().unwrap().port();
        let client = StatsdClient::new(&client_options(port)).unwrap();
        client.increment("rounds", round, &[], SampleRate::ONE);
        assert!(wait_until(|| server.stats().decoded() == round.unsigned_abs()));
        server.stop();
    }

    assert_eq!(capture.flushed(), vec!["app.rounds:1|c", "app.rounds:2|c"]);
}
