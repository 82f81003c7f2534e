//! Instrumentation for background jobs.

use super::client::MetricSenderTrait;
use super::SampleRate;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

/// Runs `work` for `worker`, timing it and counting the outcome.
///
/// Sends `jobs.<worker>.perform` as a timing, with `worker` converted to
/// snake case, then increments `jobs.processed` or `jobs.failed` tagged with
/// `worker:<worker>`. The result of `work` is returned unchanged.
///
/// # Errors
/// Returns whatever error `work` returns.
///
/// # Panics
/// If `work` panics, the timing and `jobs.failed` are still sent before the
/// panic is resumed.
///
/// # Example
///
/// ```
/// use rylv_statsd::{instrument_job, MetricType, MetricSenderTrait, SampleRate, Tag};
///
/// struct Discard;
/// impl MetricSenderTrait for Discard {
///     fn send(&self, _: &str, _: i64, _: MetricType, _: &[Tag<'_>], _: SampleRate) {}
/// }
///
/// let rows: Result<u32, String> = instrument_job(&Discard, "InvoiceMailer", || Ok(3));
/// assert_eq!(rows, Ok(3));
/// ```
pub fn instrument_job<C, T, E, F>(sender: &C, worker: &str, work: F) -> Result<T, E>
where
    C: MetricSenderTrait,
    F: FnOnce() -> Result<T, E>,
{
    let timing_name = format!("jobs.{}.perform", snake_case(worker));
    let tags = [("worker", worker)];
    let result = match catch_unwind(AssertUnwindSafe(|| {
        sender.timing(&timing_name, &[], SampleRate::ONE, work)
    })) {
        Ok(result) => result,
        Err(panic) => {
            sender.increment("jobs.failed", 1, &tags, SampleRate::ONE);
            resume_unwind(panic)
        }
    };

    let outcome = if result.is_ok() {
        "jobs.processed"
    } else {
        "jobs.failed"
    };
    sender.increment(outcome, 1, &tags, SampleRate::ONE);

    result
}

/// `Billing::InvoiceMailer` becomes `billing.invoice_mailer`.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    let name = name.replace("::", ".");
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_uppercase() {
            let after_lower = prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            // the last capital of an acronym starts a new word: HTTPServer -> http_server
            let acronym_end = prev.is_some_and(char::is_uppercase)
                && chars.peek().is_some_and(|n| n.is_lowercase());
            if after_lower || acronym_end {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}
