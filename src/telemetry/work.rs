//! Work execution span helpers.
//!
//! Each started work item gets a span covering its action; the action's
//! result is recorded on it when the task ends.

use tracing::Span;

use crate::model::WorkId;

/// Start a span for a work item's action.
///
/// The `work.outcome` field is declared empty and filled in by
/// [`record_outcome`].
pub fn start_work_span(work_id: &WorkId) -> Span {
    tracing::info_span!(
        "work.execute",
        "work.id" = %work_id.0,
        "work.outcome" = tracing::field::Empty,
    )
}

/// Record how the action ended on its span.
pub fn record_outcome(span: &Span, outcome: &Result<(), String>) {
    match outcome {
        Ok(()) => {
            span.record("work.outcome", "ok");
        }
        Err(reason) => {
            span.record("work.outcome", "error");
            span.in_scope(|| tracing::warn!(%reason, "work action failed"));
        }
    }
}
