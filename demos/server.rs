//! Running the server with aggregation and a periodic flush to the log.
//!
//! Run with: `cargo run --example server`

use rylv_statsd::{
    MetricSenderTrait, SampleRate, Server, StatsdClient, StatsdOptions,
};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt::init();

    let options = StatsdOptions {
        port: 8126,
        namespace: "demo".to_string(),
        flush_interval: Duration::from_secs(1),
        ..StatsdOptions::default()
    };

    let mut server = Server::new(options).unwrap();
    if let Err(err) = server.start() {
        eprintln!("could not start server: {err}");
        return;
    }

    let client = StatsdClient::new(server.options()).unwrap();
    for i in 0..30 {
        client.increment("loop.iterations", 1, &[], SampleRate::ONE);
        client.gauge("loop.position", i, &[], SampleRate::ONE);
        client.timing_value("loop.latency", 10 + i % 7, &[], SampleRate::ONE);
        std::thread::sleep(Duration::from_millis(100));
    }

    let stats = server.stats();
    println!(
        "received {} datagrams, {} metrics, {} malformed",
        stats.received(),
        stats.decoded(),
        stats.malformed()
    );

    // joins the listener and runs the final flush
    server.stop();
}
