use rylv_statsd::{FlushWriterTrait, FlushWriterType, MetricResult, MetricType, StatsdOptions};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Collects flushed records as `metric:value|type` lines
#[derive(Clone, Default)]
pub struct CaptureWriter {
    pending: Vec<String>,
    flushed: Arc<Mutex<Vec<String>>>,
}

impl CaptureWriter {
    pub fn flushed(&self) -> Vec<String> {
        self.flushed.lock().unwrap().clone()
    }

    pub fn writer_type(&self) -> FlushWriterType {
        FlushWriterType::Custom(Box::new(self.clone()))
    }
}

impl FlushWriterTrait for CaptureWriter {
    fn write(&mut self, metric: &[&str], value: &str, metric_type: MetricType) -> MetricResult<()> {
        self.pending
            .push(format!("{}:{value}|{metric_type}", metric.concat()));
        Ok(())
    }

    fn flush(&mut self) -> MetricResult<usize> {
        let records = self.pending.len();
        self.flushed.lock().unwrap().append(&mut self.pending);
        Ok(records)
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Server options on an ephemeral loopback port with a flush interval long
/// enough that only the final flush on stop runs
pub fn test_options(capture: &CaptureWriter) -> StatsdOptions {
    StatsdOptions {
        port: 0,
        recv_buffer_size: 0,
        poll_interval: Duration::from_millis(10),
        flush_interval: Duration::from_secs(3600),
        flush_writer: capture.writer_type(),
        ..StatsdOptions::default()
    }
}

/// Options for a client sending to `port`
pub fn client_options(port: u16) -> StatsdOptions {
    StatsdOptions {
        port,
        namespace: "app".to_string(),
        ..StatsdOptions::default()
    }
}

/// Polls `condition` until it holds or five seconds elapse
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
