//! Notification assembly and best-effort publishing.

use rowpipe_gateways::{Notification, Notifier};
use rowpipe_shared::{BatchOutcome, CanonicalRecord, Locator, RowpipeError};
use serde_json::json;
use tracing::{debug, warn};

/// Row errors included in a batch notification; the full list stays in the outcome.
const MAX_NOTIFIED_ERRORS: usize = 20;

/// Publish and swallow any failure after logging it.
pub(crate) async fn publish_best_effort(notifier: &dyn Notifier, notification: &Notification) {
    match notifier.publish(notification).await {
        Ok(()) => debug!(subject = %notification.subject, "notification published"),
        Err(e) => warn!(
            subject = %notification.subject,
            kind = e.kind(),
            error = %e,
            "notification failed, continuing"
        ),
    }
}

pub(crate) fn batch_completed(locator: &Locator, outcome: &BatchOutcome) -> Notification {
    let status = if outcome.rejected + outcome.failed == 0 {
        "success"
    } else {
        "partial"
    };
    let errors: Vec<_> = outcome.errors.iter().take(MAX_NOTIFIED_ERRORS).collect();

    Notification::new(
        format!("CSV processing completed: {}", locator.key),
        json!({
            "status": "completed",
            "batch_id": outcome.batch_id,
            "bucket": locator.bucket,
            "key": locator.key,
            "digest": outcome.digest,
            "total": outcome.total,
            "succeeded": outcome.succeeded,
            "rejected": outcome.rejected,
            "failed": outcome.failed,
            "success_rate": format!("{:.2}%", outcome.success_rate * 100.0),
            "elapsed_ms": outcome.elapsed_ms,
            "errors": errors,
        }),
    )
    .tag("event_type", "csv_processed")
    .tag("status", status)
}

pub(crate) fn batch_failed(locator: &Locator, error: &RowpipeError) -> Notification {
    Notification::new(
        format!("CSV processing failed: {}", locator.key),
        json!({
            "status": "failed",
            "batch_id": locator.to_string(),
            "bucket": locator.bucket,
            "key": locator.key,
            "kind": error.kind(),
            "error": error.to_string(),
        }),
    )
    .tag("event_type", "csv_processing_failed")
    .tag("status", "error")
}

pub(crate) fn record_created(record: &CanonicalRecord) -> Notification {
    Notification::new(
        "Item created",
        json!({
            "action": "create",
            "id": record.id,
            "timestamp": record.timestamp,
            "name": record.name,
            "category": record.category,
            "source": record.source.kind(),
            "caller": record.source.detail(),
        }),
    )
    .tag("event_type", "item_created")
    .tag("source", record.source.kind())
}
