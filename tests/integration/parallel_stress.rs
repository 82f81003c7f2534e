use rylv_statsd::{Aggregator, SigFig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

#[test]
fn test_parallel_increments_with_concurrent_drains() {
    let aggregator = Arc::new(Aggregator::default());
    let num_threads = 8;
    let iterations_per_thread = 10_000;

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                for i in 0..iterations_per_thread {
                    aggregator.increment("parallel.shared", 1);
                    aggregator.increment(&format!("parallel.thread.{thread_id}"), 1);
                    aggregator.set_gauge("parallel.gauge", i);
                    aggregator.record_timing("parallel.timing", i % 250).unwrap();
                }
            })
        })
        .collect();

    // drain while writers are running; no increment may be lost or counted twice
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    let mut timing_count = 0;
    while handles.iter().any(|handle| !handle.is_finished()) {
        for (metric, value) in aggregator.drain_counters() {
            *totals.entry(metric).or_default() += value;
        }
        timing_count += aggregator
            .drain_timings()
            .values()
            .map(|summary| summary.count)
            .sum::<u64>();
        thread::yield_now();
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let rest = aggregator.drain();
    for (metric, value) in rest.counters {
        *totals.entry(metric).or_default() += value;
    }
    timing_count += rest
        .timings
        .values()
        .map(|summary| summary.count)
        .sum::<u64>();

    assert_eq!(totals["parallel.shared"], num_threads * iterations_per_thread);
    for thread_id in 0..num_threads {
        assert_eq!(
            totals[&format!("parallel.thread.{thread_id}")],
            iterations_per_thread
        );
    }
    assert_eq!(timing_count, 80_000);
}

#[test]
fn test_idle_metrics_are_evicted() {
    let aggregator = Aggregator::with_hasher_builder(ahash::RandomState::new(), SigFig::default());
    aggregator.increment("short.lived", 1);
    aggregator.record_timing("short.lived.timing", 5).unwrap();
    assert_eq!(aggregator.tracked_metrics(), 2);

    // first drain reports, second finds them idle
    assert!(!aggregator.drain().is_empty());
    assert!(aggregator.drain().is_empty());
    assert_eq!(aggregator.tracked_metrics(), 0);
}
