//! Convenience macros for sending metrics with inline tags.
//!
//! Tags are written as `"key" => "value"` pairs and every macro sends at a
//! sample rate of one. Use the [`crate::MetricSenderTrait`] methods directly
//! for other sample rates.

/// Increments a counter by one.
///
/// # Examples
///
/// ```
/// use rylv_statsd::{increment, StatsdClient, StatsdOptions};
///
/// let options = StatsdOptions::default();
/// let client = StatsdClient::new(&options).unwrap();
///
/// increment!(client, "requests", "endpoint" => "api", "method" => "get");
/// increment!(client, "events.total");
/// ```
#[macro_export]
macro_rules! increment {
    ($client:expr, $metric:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::increment_by!($client, $metric, 1 $(, $key => $value)*)
    };
}

/// Increments a counter by the given amount.
///
/// # Examples
///
/// ```
/// use rylv_statsd::{increment_by, StatsdClient, StatsdOptions};
///
/// let options = StatsdOptions::default();
/// let client = StatsdClient::new(&options).unwrap();
///
/// increment_by!(client, "bytes.sent", 1024, "endpoint" => "api");
/// ```
#[macro_export]
macro_rules! increment_by {
    ($client:expr, $metric:expr, $by:expr $(, $key:expr => $value:expr)* $(,)?) => {{
        let tags: &[$crate::Tag<'_>] = &[$(($key, $value)),*];
        $crate::MetricSenderTrait::increment(&$client, $metric, $by, tags, $crate::SampleRate::ONE)
    }};
}

/// Records a gauge value.
///
/// # Examples
///
/// ```
/// use rylv_statsd::{gauge, StatsdClient, StatsdOptions};
///
/// let options = StatsdOptions::default();
/// let client = StatsdClient::new(&options).unwrap();
///
/// gauge!(client, "connections.active", 42, "pool" => "main");
/// gauge!(client, "memory.usage", 512);
/// ```
#[macro_export]
macro_rules! gauge {
    ($client:expr, $metric:expr, $value:expr $(, $tag_key:expr => $tag_value:expr)* $(,)?) => {{
        let tags: &[$crate::Tag<'_>] = &[$(($tag_key, $tag_value)),*];
        $crate::MetricSenderTrait::gauge(&$client, $metric, $value, tags, $crate::SampleRate::ONE)
    }};
}

/// Times a closure and evaluates to its result.
///
/// # Examples
///
/// ```
/// use rylv_statsd::{timing, StatsdClient, StatsdOptions};
///
/// let options = StatsdOptions::default();
/// let client = StatsdClient::new(&options).unwrap();
///
/// let rows = timing!(client, "db.query", "table" => "users"; || 42);
/// assert_eq!(rows, 42);
/// let rows = timing!(client, "db.query", || 7);
/// assert_eq!(rows, 7);
/// ```
#[macro_export]
macro_rules! timing {
    ($client:expr, $metric:expr $(, $key:expr => $value:expr)+ ; $block:expr) => {{
        let tags: &[$crate::Tag<'_>] = &[$(($key, $value)),+];
        $crate::MetricSenderTrait::timing(&$client, $metric, tags, $crate::SampleRate::ONE, $block)
    }};
    ($client:expr, $metric:expr, $block:expr) => {
        $crate::MetricSenderTrait::timing(&$client, $metric, &[], $crate::SampleRate::ONE, $block)
    };
}
