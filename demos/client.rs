//! Sending counters, gauges and timings with the client and the macros.
//!
//! Run with: `cargo run --example client`
//! and watch the datagrams with: `nc -ul 8125`

use rylv_statsd::{
    gauge, increment, increment_by, timing, MetricSenderTrait, SampleRate, StatsdClient,
    StatsdOptions,
};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt::init();

    let options = StatsdOptions {
        namespace: "myapp".to_string(),
        ..StatsdOptions::default()
    };
    let client = StatsdClient::new(&options).unwrap();

    // Direct API: myapp.request.count:1|c|#endpoint:api
    client.increment("request.count", 1, &[("endpoint", "api")], SampleRate::ONE);

    // Sample rate is only annotated; the server does not scale by it
    client.increment("cache.miss", 1, &[], SampleRate::new(0.1).unwrap());

    client.gauge("connections.active", 42, &[("pool", "main")], SampleRate::ONE);

    // Timing of a block, sent even when it returns an error
    let parsed: Result<u32, std::num::ParseIntError> =
        client.timing("config.parse", &[], SampleRate::ONE, || "1234".parse());
    println!("parsed {parsed:?}");

    // Guard form for timings spanning several statements
    {
        let _timer = client.start_timer("batch.process", &[("stage", "load")], SampleRate::ONE);
        std::thread::sleep(Duration::from_millis(25));
    }

    // Macros with inline tags
    increment!(client, "macro.count", "endpoint" => "api");
    increment_by!(client, "bytes.sent", 1024);
    gauge!(client, "memory.usage", 512, "unit" => "mb");
    let rows = timing!(client, "db.query", "table" => "users"; || {
        std::thread::sleep(Duration::from_millis(5));
        3
    });
    println!("query returned {rows} rows");
}
