//! Encoding and decoding of the StatsD line format.
//!
//! ```text
//! <namespace>.<metric>:<value>|<type>[|@<sample_rate>][|#<key>:<value>,...]
//! ```
//!
//! `type` is one of `c`, `g` or `ms` and `value` is a base-10 signed integer.
//! Decoding only recovers the metric name, value and type; the sample rate and
//! tag sections are left to the upstream collector.

use std::fmt::Write;

use itoa::Buffer;

use super::{MetricType, SampleRate, Tag};
use crate::{MetricResult, MetricsError};

/// A metric recovered from a wire line.
///
/// The name borrows from the decoded line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMetric<'a> {
    /// Metric name, including any namespace the sender applied.
    pub name: &'a str,
    /// Metric value.
    pub value: i64,
    /// Metric type.
    pub metric_type: MetricType,
}

/// Encodes a metric into a new wire line.
///
/// An empty `namespace` writes the metric name without prefix.
#[must_use]
pub fn encode(
    namespace: &str,
    metric: &str,
    value: i64,
    metric_type: MetricType,
    sample_rate: SampleRate,
    tags: &[Tag<'_>],
) -> String {
    let mut line = String::with_capacity(metric_len(namespace, metric, metric_type, tags) + 20);
    encode_into(
        &mut line,
        namespace,
        metric,
        value,
        metric_type,
        sample_rate,
        tags,
    );
    line
}

/// Appends the wire line of a metric to `buffer`.
pub fn encode_into(
    buffer: &mut String,
    namespace: &str,
    metric: &str,
    value: i64,
    metric_type: MetricType,
    sample_rate: SampleRate,
    tags: &[Tag<'_>],
) {
    if !namespace.is_empty() {
        buffer.push_str(namespace);
        buffer.push('.');
    }
    buffer.push_str(metric);
    buffer.push(':');
    buffer.push_str(Buffer::new().format(value));
    buffer.push('|');
    buffer.push_str(metric_type.as_str());

    if sample_rate.is_sampled() {
        // writing into a String never fails
        let _ = write!(buffer, "|@{}", sample_rate.value());
    }

    let mut iter = tags.iter();
    if let Some((key, value)) = iter.next() {
        buffer.push_str("|#");
        buffer.push_str(key);
        buffer.push(':');
        buffer.push_str(value);
        for (key, value) in iter {
            buffer.push(',');
            buffer.push_str(key);
            buffer.push(':');
            buffer.push_str(value);
        }
    }
}

/// Length of a line without its value and sample rate.
#[inline]
fn metric_len(namespace: &str, metric: &str, metric_type: MetricType, tags: &[Tag<'_>]) -> usize {
    // "<ns>." + metric + ':' + '|' + type
    let mut len = metric.len() + metric_type.as_str().len() + 2;
    if !namespace.is_empty() {
        len += namespace.len() + 1;
    }
    if !tags.is_empty() {
        len += 2; // '|#'
        for (key, value) in tags {
            len += key.len() + value.len() + 2; // ':' and ','
        }
    }
    len
}

/// Decodes a single wire line.
///
/// # Errors
/// Returns [`MetricsError::MalformedMetric`] when the `|` or `:` separator is
/// missing, the name is empty, the value is not an `i64` or the type is not
/// `c`, `g` or `ms`.
pub fn decode(line: &str) -> MetricResult<DecodedMetric<'_>> {
    let trimmed = line.trim();

    let Some((metric_data, rest)) = trimmed.split_once('|') else {
        return Err(MetricsError::malformed(line, "missing '|' separator"));
    };
    let wire_type = rest.split_once('|').map_or(rest, |(wire_type, _)| wire_type);

    let Some((name, value)) = metric_data.split_once(':') else {
        return Err(MetricsError::malformed(line, "missing ':' separator"));
    };
    if name.is_empty() {
        return Err(MetricsError::malformed(line, "empty metric name"));
    }

    let Ok(value) = value.parse::<i64>() else {
        return Err(MetricsError::malformed(line, "value is not a 64-bit integer"));
    };

    let Some(metric_type) = MetricType::from_wire(wire_type) else {
        return Err(MetricsError::malformed(line, "unsupported metric type"));
    };

    Ok(DecodedMetric {
        name,
        value,
        metric_type,
    })
}

/// Decodes every line of a datagram.
///
/// Lines are separated by `\n`; blank lines are skipped.
///
/// # Errors
/// Returns [`MetricsError::MalformedMetric`] when the payload is not UTF-8.
/// Errors of single lines are yielded by the iterator.
pub fn decode_datagram(
    payload: &[u8],
) -> MetricResult<impl Iterator<Item = MetricResult<DecodedMetric<'_>>>> {
    let Ok(text) = std::str::from_utf8(payload) else {
        return Err(MetricsError::malformed(
            &String::from_utf8_lossy(payload),
            "payload is not valid UTF-8",
        ));
    };

    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(decode))
}
