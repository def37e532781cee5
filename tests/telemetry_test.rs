//! Integration tests for telemetry initialization and span helpers.

use tgpg::model::WorkId;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // Using try_init() in the implementation avoids panics if another
    // test already initialized a subscriber.
    let config = tgpg::telemetry::TelemetryConfig {
        log_level: "debug".to_string(),
        endpoint: None,
        service_name: "tgpg-test".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let _guard = tgpg::telemetry::init_telemetry(config);
}

#[test]
fn work_span_records_outcomes() {
    let span = tgpg::telemetry::work::start_work_span(&WorkId::new());
    tgpg::telemetry::work::record_outcome(&span, &Ok(()));
    tgpg::telemetry::work::record_outcome(&span, &Err("chat not found".to_string()));
}

#[test]
fn metric_instruments_build_without_provider() {
    tgpg::telemetry::metrics::work_dispatched().add(1, &[]);
    tgpg::telemetry::metrics::work_duration_ms().record(12.5, &[]);
}
