//! Failures confined to one entity or one page.

use anyhow::Result;
use cleaner::{JobState, StoreError};
use std::sync::Arc;
use tests_integration::fixtures::{CleanupTestContext, FailingListener};
use tests_integration::generators::HistoryGenerator;
use tests_integration::init_test_logging;

use crate::completed;

#[tokio::test]
async fn test_failed_entity_does_not_affect_siblings() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    let ids = HistoryGenerator::new("doc")
        .entities(6)
        .revisions(55)
        .populate(&ctx.repository);
    ctx.repository
        .fail_entity(&ids[2], StoreError::Backend("disk full".to_string()));

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.entities_attempted, 6);
    assert_eq!(summary.entities_failed, 1);
    assert_eq!(summary.revisions_deleted, 25);
    assert!(!summary.is_partial());

    for (i, id) in ids.iter().enumerate() {
        let expected = if i == 2 { 55 } else { 50 };
        assert_eq!(ctx.revision_count(id), expected, "entity {id}");
    }
    Ok(())
}

#[tokio::test]
async fn test_listener_failure_rolls_back_entity() -> Result<()> {
    init_test_logging();
    let base = CleanupTestContext::new();
    let ids = HistoryGenerator::new("doc")
        .entities(2)
        .revisions(55)
        .populate(&base.repository);
    let listener = Arc::new(FailingListener::new(ids[0].clone(), 3));
    let ctx = base.with_listener(listener.clone());

    let summary = completed(ctx.run().await?);

    // Two deletions happened before the third notification failed
    assert_eq!(listener.seen(), 3);
    assert_eq!(summary.entities_failed, 1);
    assert_eq!(ctx.revision_count(&ids[0]), 55);
    assert_eq!(ctx.revision_count(&ids[1]), 50);
    assert!(ctx.repository.rolled_back_transactions() >= 1);
    Ok(())
}

#[tokio::test]
async fn test_search_failure_ends_run_early() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    let ids = HistoryGenerator::new("doc")
        .entities(8)
        .revisions(52)
        .populate(&ctx.repository);
    ctx.repository
        .fail_search_at(5, StoreError::Backend("index offline".to_string()));

    let job = ctx.job();
    let summary = completed(job.execute().await?);

    assert!(summary.is_partial());
    assert_eq!(summary.terminated_at_offset, Some(5));
    assert!(
        summary
            .termination_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("index offline"))
    );
    assert_eq!(summary.pages, 1);
    assert_eq!(summary.revisions_deleted, 10);

    for id in &ids[..5] {
        assert_eq!(ctx.revision_count(id), 50);
    }
    for id in &ids[5..] {
        assert_eq!(ctx.revision_count(id), 52);
    }

    assert_eq!(job.state(), JobState::Completed);
    assert!(!ctx.is_locked());
    assert_eq!(ctx.repository.open_result_sets(), 0);
    Ok(())
}
