#![no_main]

use libfuzzer_sys::fuzz_target;
use rylv_statsd::{decode_datagram, Aggregator, MetricType};

// Feed fuzzed datagrams through the aggregator and drain it twice
fuzz_target!(|data: &[u8]| {
    let aggregator = Aggregator::default();

    if let Ok(lines) = decode_datagram(data) {
        for metric in lines.flatten() {
            match metric.metric_type {
                MetricType::Count => aggregator.increment(metric.name, metric.value),
                MetricType::Gauge => aggregator.set_gauge(metric.name, metric.value),
                MetricType::Timing => {
                    let _ = aggregator.record_timing(metric.name, metric.value);
                }
            }
        }
    }

    let _ = aggregator.drain();
    // everything left after a full drain is idle and gets evicted
    assert!(aggregator.drain().is_empty());
    assert_eq!(aggregator.tracked_metrics(), 0);
});
