//! Mutual exclusion between runs through the cluster-wide lock.

use anyhow::Result;
use cleaner::store::LockService;
use cleaner::{JobOutcome, JobState, RunState};
use std::sync::Arc;
use std::time::Duration;
use tests_integration::fixtures::{CleanupTestContext, GateListener};
use tests_integration::generators::HistoryGenerator;
use tests_integration::init_test_logging;

use crate::completed;

#[tokio::test]
async fn test_concurrent_run_is_turned_away() -> Result<()> {
    init_test_logging();
    let gate = Arc::new(GateListener::new());
    let ctx = CleanupTestContext::new().with_listener(gate.clone());
    HistoryGenerator::new("doc")
        .entities(2)
        .revisions(52)
        .populate(&ctx.repository);

    let first = ctx.job();
    let second = ctx.job();

    let (first_outcome, second_outcome) = tokio::join!(first.execute(), async {
        gate.wait_entered().await;
        assert!(first.is_running());
        assert!(ctx.is_locked());

        let outcome = second.execute().await;
        gate.open();
        outcome
    });

    assert_eq!(second_outcome?, JobOutcome::LockUnavailable);
    assert_eq!(second.state(), JobState::Idle);
    assert_eq!(second.run_state(), RunState::default());

    let summary = completed(first_outcome?);
    assert_eq!(summary.revisions_deleted, 4);
    assert!(!ctx.is_locked());
    Ok(())
}

#[tokio::test]
async fn test_lock_held_elsewhere_blocks_until_released() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    HistoryGenerator::new("doc")
        .entities(2)
        .revisions(52)
        .populate(&ctx.repository);

    let token = ctx
        .repository
        .acquire(&ctx.config.lock_name, Duration::from_secs(600))
        .await?;

    assert_eq!(ctx.run().await?, JobOutcome::LockUnavailable);
    assert!(ctx.repository.searches().is_empty());
    assert_eq!(ctx.total_revisions(), 104);

    ctx.repository
        .release(&token, &ctx.config.lock_name)
        .await?;

    let summary = completed(ctx.run().await?);
    assert_eq!(summary.revisions_deleted, 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_expired_lock_can_be_taken_over() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    HistoryGenerator::new("doc")
        .revisions(52)
        .populate(&ctx.repository);

    ctx.repository
        .acquire(&ctx.config.lock_name, Duration::from_secs(1))
        .await?;
    tokio::time::advance(Duration::from_secs(2)).await;

    let summary = completed(ctx.run().await?);
    assert_eq!(summary.revisions_deleted, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_ends_run_early() -> Result<()> {
    init_test_logging();
    let gate = Arc::new(GateListener::new());
    let ctx = CleanupTestContext::new().with_listener(gate.clone());
    let ids = HistoryGenerator::new("doc")
        .entities(8)
        .revisions(52)
        .populate(&ctx.repository);

    let job = ctx.job();
    let (outcome, ()) = tokio::join!(job.execute(), async {
        gate.wait_entered().await;
        // Older than half the 60s TTL by the time the next page starts
        tokio::time::advance(Duration::from_secs(40)).await;
        ctx.repository.fail_lock_refresh(true);
        gate.open();
    });

    let summary = completed(outcome?);
    assert!(summary.is_partial());
    assert_eq!(summary.terminated_at_offset, Some(5));
    assert_eq!(summary.pages, 1);
    for id in &ids[5..] {
        assert_eq!(ctx.revision_count(id), 52);
    }
    assert!(!ctx.is_locked());
    Ok(())
}

#[tokio::test]
async fn test_overlapping_execute_on_same_job_is_rejected() -> Result<()> {
    init_test_logging();
    let gate = Arc::new(GateListener::new());
    let ctx = CleanupTestContext::new().with_listener(gate.clone());
    HistoryGenerator::new("doc")
        .entities(2)
        .revisions(52)
        .populate(&ctx.repository);

    let job = ctx.job();
    let (first_outcome, second_outcome) = tokio::join!(job.execute(), async {
        gate.wait_entered().await;
        let outcome = job.execute().await;

        // The run in flight is left untouched
        assert_eq!(job.state(), JobState::Running);
        assert!(job.is_running());
        assert!(job.end_date().is_none());

        gate.open();
        outcome
    });

    assert_eq!(second_outcome?, JobOutcome::AlreadyRunning);
    let summary = completed(first_outcome?);
    assert_eq!(summary.revisions_deleted, 4);
    assert_eq!(job.state(), JobState::Completed);
    assert!(!job.is_running());
    assert_eq!(job.metrics().runs_started(), 1);

    // The guard is gone once the run is over
    let summary = completed(job.execute().await?);
    assert_eq!(summary.revisions_deleted, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropped_run_releases_lock_and_closes_run_state() -> Result<()> {
    init_test_logging();
    let gate = Arc::new(GateListener::new());
    let ctx = CleanupTestContext::new().with_listener(gate.clone());
    HistoryGenerator::new("doc")
        .entities(2)
        .revisions(52)
        .populate(&ctx.repository);

    let job = ctx.job();
    let timed_out = tokio::time::timeout(Duration::from_millis(200), job.execute())
        .await
        .is_err();
    assert!(timed_out);

    assert!(!job.is_running());
    assert_eq!(job.state(), JobState::Aborted);
    assert!(job.start_date().is_some());
    assert!(job.end_date().is_some());
    assert_eq!(job.metrics().runs_aborted(), 1);

    // The lock is released by a background task
    for _ in 0..10 {
        if !ctx.is_locked() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(!ctx.is_locked());

    // The gate only parks the first deletion, so the next run goes through
    completed(job.execute().await?);
    assert_eq!(ctx.total_revisions(), 100);
    assert_eq!(job.state(), JobState::Completed);
    assert!(!ctx.is_locked());
    Ok(())
}
