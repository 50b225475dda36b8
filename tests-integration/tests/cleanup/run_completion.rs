//! Full runs over histories exercising both retention passes.

use anyhow::Result;
use chrono::{Duration, Utc};
use cleaner::{EntityId, InMemoryRepository, JobState, RepositorySnapshot};
use tests_integration::fixtures::CleanupTestContext;
use tests_integration::generators::HistoryGenerator;
use tests_integration::init_test_logging;

use crate::completed;

#[tokio::test]
async fn test_count_and_age_passes() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    let now = Utc::now();

    // Below both thresholds: kept even though every revision is expired
    let small = EntityId::new("small");
    ctx.repository
        .insert_history(&small, 4, now - Duration::days(100), Duration::days(1));

    // Over the count limit, all recent
    let large = EntityId::new("large");
    ctx.repository
        .insert_history(&large, 54, now - Duration::hours(1), Duration::minutes(10));

    // Under the count limit, all older than the cutoff
    let expired = EntityId::new("expired");
    ctx.repository
        .insert_history(&expired, 15, now - Duration::days(60), Duration::days(1));

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.pages, 1);
    assert_eq!(summary.entities_attempted, 3);
    assert_eq!(summary.entities_failed, 0);
    assert_eq!(summary.revisions_deleted, 9);
    assert!(!summary.is_partial());

    assert_eq!(ctx.revision_count(&small), 4);

    let large_labels = ctx.revision_labels(&large);
    assert_eq!(large_labels.len(), 50);
    for oldest in ["1.0", "1.1", "1.2", "1.3"] {
        assert!(!large_labels.contains(&oldest.to_string()));
    }
    assert!(large_labels.contains(&"1.53".to_string()));

    let expired_labels = ctx.revision_labels(&expired);
    assert_eq!(expired_labels.len(), 10);
    for oldest in ["1.0", "1.1", "1.2", "1.3", "1.4"] {
        assert!(!expired_labels.contains(&oldest.to_string()));
    }
    assert!(expired_labels.contains(&"1.5".to_string()));

    assert!(!ctx.is_locked());
    Ok(())
}

#[tokio::test]
async fn test_second_run_is_a_no_op() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    HistoryGenerator::new("doc")
        .entities(4)
        .revisions(55)
        .populate(&ctx.repository);

    let job = ctx.job();
    let first = completed(job.execute().await?);
    assert_eq!(first.revisions_deleted, 20);

    let second = completed(job.execute().await?);
    assert_eq!(second.revisions_deleted, 0);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(ctx.total_revisions(), 200);

    assert_eq!(job.state(), JobState::Completed);
    assert!(!job.is_running());
    let run_state = job.run_state();
    assert!(run_state.start_date.is_some());
    assert!(run_state.start_date <= run_state.end_date);

    let metrics = job.metrics().summary();
    assert_eq!(metrics.runs_started, 2);
    assert_eq!(metrics.runs_completed, 2);
    assert_eq!(metrics.revisions_deleted, 20);
    Ok(())
}

#[tokio::test]
async fn test_run_over_serialized_snapshot() -> Result<()> {
    init_test_logging();
    let generated = HistoryGenerator::new("doc")
        .entities(12)
        .revisions(60)
        .snapshot();
    let json = serde_json::to_string(&generated)?;
    let snapshot: RepositorySnapshot = serde_json::from_str(&json)?;

    let ctx = CleanupTestContext::with_repository(InMemoryRepository::from_snapshot(snapshot));
    let summary = completed(ctx.run().await?);

    // 12 entities over pages of 5
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.entities_attempted, 12);
    assert_eq!(summary.revisions_deleted, 120);

    let cleaned = ctx.repository.snapshot();
    assert_eq!(cleaned.revision_count(), 600);
    for entity in &cleaned.entities {
        let labels: Vec<&str> = entity
            .revisions
            .iter()
            .flatten()
            .map(|r| r.label.as_str())
            .collect();
        assert!(labels.contains(&"1.59"));
        assert!(!labels.contains(&"1.9"));
    }
    Ok(())
}
