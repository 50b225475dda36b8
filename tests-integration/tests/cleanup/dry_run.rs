//! Dry runs select revisions without touching them.

use anyhow::Result;
use chrono::{Duration, Utc};
use cleaner::EntityId;
use std::sync::Arc;
use tests_integration::fixtures::{CleanupTestContext, RecordingListener};
use tests_integration::init_test_logging;

use crate::completed;

#[tokio::test]
async fn test_dry_run_reports_selection_only() -> Result<()> {
    init_test_logging();
    let listener = Arc::new(RecordingListener::new("recorder"));
    let base = CleanupTestContext::new().with_listener(listener.clone());
    let config = base.config.clone().with_dry_run(true);
    let ctx = base.with_config(config);
    let now = Utc::now();

    let large = EntityId::new("large");
    ctx.repository
        .insert_history(&large, 54, now - Duration::hours(1), Duration::minutes(10));
    let expired = EntityId::new("expired");
    ctx.repository
        .insert_history(&expired, 15, now - Duration::days(60), Duration::days(1));

    let summary = completed(ctx.run().await?);

    assert!(summary.dry_run);
    assert_eq!(summary.revisions_selected, 9);
    assert_eq!(summary.revisions_deleted, 0);
    assert_eq!(ctx.revision_count(&large), 54);
    assert_eq!(ctx.revision_count(&expired), 15);
    assert!(listener.calls().is_empty());
    Ok(())
}
