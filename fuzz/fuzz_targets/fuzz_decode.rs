#![no_main]

use libfuzzer_sys::fuzz_target;
use rylv_statsd::{decode, decode_datagram, encode, SampleRate};

// Arbitrary datagrams must decode or fail cleanly, never panic
fuzz_target!(|data: &[u8]| {
    let Ok(lines) = decode_datagram(data) else {
        return;
    };

    for metric in lines.flatten() {
        assert!(!metric.name.is_empty());

        // a decoded metric re-encodes to a line that decodes to the same metric
        let line = encode("", metric.name, metric.value, metric.metric_type, SampleRate::ONE, &[]);
        if let Ok(again) = decode(&line) {
            assert_eq!(again.value, metric.value);
            assert_eq!(again.metric_type, metric.metric_type);
        }
    }
});
