//! Wrapping background jobs so every run reports a timing and an outcome counter.
//!
//! Run with: `cargo run --example job_instrumentation`

use rylv_statsd::{instrument_job, Server, StatsdClient, StatsdOptions};
use std::time::Duration;

fn send_invoice(id: u32) -> Result<u32, String> {
    std::thread::sleep(Duration::from_millis(10));
    if id % 3 == 0 {
        Err(format!("invoice {id} rejected"))
    } else {
        Ok(id)
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let options = StatsdOptions {
        port: 8127,
        namespace: "worker".to_string(),
        flush_interval: Duration::from_secs(60),
        ..StatsdOptions::default()
    };
    let mut server = Server::new(options).unwrap();
    server.start().unwrap();

    let client = StatsdClient::new(server.options()).unwrap();
    for id in 1..=9 {
        // worker.jobs.invoice_mailer.perform, then worker.jobs.processed or worker.jobs.failed
        match instrument_job(&client, "InvoiceMailer", || send_invoice(id)) {
            Ok(id) => println!("sent invoice {id}"),
            Err(err) => println!("job failed: {err}"),
        }
    }

    std::thread::sleep(Duration::from_millis(200));
    // the final flush logs the aggregated job metrics
    server.stop();
}
