//! Shutdown requests between pages.

use anyhow::Result;
use cleaner::{JobOutcome, JobState};
use std::sync::Arc;
use tests_integration::fixtures::{CancellingListener, CleanupTestContext};
use tests_integration::generators::HistoryGenerator;
use tests_integration::init_test_logging;

#[tokio::test]
async fn test_shutdown_stops_after_current_page() -> Result<()> {
    init_test_logging();
    let base = CleanupTestContext::new();
    let ids = HistoryGenerator::new("doc")
        .entities(12)
        .revisions(52)
        .populate(&base.repository);
    let listener = Arc::new(CancellingListener::new(base.cancellation.clone()));
    let config = base.config.clone().with_worker_count(1);
    let ctx = base.with_config(config).with_listener(listener);

    let job = ctx.job();
    let summary = match job.execute().await? {
        JobOutcome::Aborted(summary) => summary,
        other => panic!("expected an aborted run, got {other:?}"),
    };

    // The page in flight is finished, the next one is never fetched
    assert_eq!(summary.pages, 1);
    assert_eq!(summary.entities_attempted, 5);
    assert_eq!(summary.revisions_deleted, 10);
    assert!(!summary.is_partial());
    assert_eq!(ctx.repository.searches().len(), 1);

    for id in &ids[..5] {
        assert_eq!(ctx.revision_count(id), 50);
    }
    for id in &ids[5..] {
        assert_eq!(ctx.revision_count(id), 52);
    }

    assert_eq!(job.state(), JobState::Aborted);
    assert!(!job.is_running());
    assert!(job.end_date().is_some());
    assert_eq!(job.metrics().runs_aborted(), 1);
    assert!(!ctx.is_locked());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_before_first_page() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    HistoryGenerator::new("doc")
        .entities(3)
        .revisions(52)
        .populate(&ctx.repository);
    ctx.cancellation.cancel();

    let outcome = ctx.run().await?;

    let JobOutcome::Aborted(summary) = outcome else {
        panic!("expected an aborted run, got {outcome:?}");
    };
    assert_eq!(summary.pages, 0);
    assert_eq!(summary.revisions_deleted, 0);
    assert!(ctx.repository.searches().is_empty());
    assert_eq!(ctx.total_revisions(), 156);
    assert!(!ctx.is_locked());
    Ok(())
}
