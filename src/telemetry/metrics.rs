//! Metric instrument factories for tgpg.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"tgpg"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for tgpg instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("tgpg")
}

/// Counter: notifications received.
/// Labels: `result` ("accepted" | "ignored" | "rejected").
pub fn notifications() -> Counter<u64> {
    meter()
        .u64_counter("tgpg.notifications")
        .with_description("Number of database notifications received")
        .build()
}

/// Counter: work item callbacks started.
pub fn work_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("tgpg.work.dispatched")
        .with_description("Number of work items started")
        .build()
}

/// Counter: work items retired.
/// Labels: `reason` ("completed" | "failed" | "timed_out" | "cancelled").
pub fn work_retired() -> Counter<u64> {
    meter()
        .u64_counter("tgpg.work.retired")
        .with_description("Number of work items removed from the queue")
        .build()
}

/// Histogram: time from start to retirement of a work item.
/// Labels: `reason`.
pub fn work_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("tgpg.work.duration_ms")
        .with_description("Work item execution time in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: heartbeat outcomes.
/// Labels: `result` ("ok" | "error").
pub fn heartbeats() -> Counter<u64> {
    meter()
        .u64_counter("tgpg.heartbeats")
        .with_description("Number of heartbeat calls completed")
        .build()
}

/// Counter: fatal transport errors that triggered backoff.
pub fn fatal_errors() -> Counter<u64> {
    meter()
        .u64_counter("tgpg.fatal_errors")
        .with_description("Number of fatal errors that stopped the dispatcher")
        .build()
}
