//! Pre-delete notifications.

use anyhow::Result;
use chrono::{Duration, Utc};
use cleaner::EntityId;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tests_integration::fixtures::{CleanupTestContext, RecordingListener};
use tests_integration::init_test_logging;

#[tokio::test]
async fn test_listeners_run_in_registration_order() -> Result<()> {
    init_test_logging();
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::new(RecordingListener::with_log("first", log.clone()));
    let second = Arc::new(RecordingListener::with_log("second", log.clone()));
    let ctx = CleanupTestContext::new()
        .with_listener(first.clone())
        .with_listener(second);

    let entity = EntityId::new("large");
    ctx.repository.insert_history(
        &entity,
        54,
        Utc::now() - Duration::hours(1),
        Duration::minutes(10),
    );

    ctx.run().await?;

    let calls = first.calls();
    assert_eq!(calls.len(), 8);
    for pair in calls.chunks(2) {
        assert_eq!(pair[0].listener, "first");
        assert_eq!(pair[1].listener, "second");
        assert_eq!(pair[0].label, pair[1].label);
    }

    // Each notification sees the history as left by the previous deletion
    let lengths: Vec<usize> = calls.iter().step_by(2).map(|c| c.history_len).collect();
    assert_eq!(lengths, vec![54, 53, 52, 51]);

    let labels: BTreeSet<String> = calls.into_iter().map(|c| c.label).collect();
    let expected: BTreeSet<String> = (0..4).map(|i| format!("1.{i}")).collect();
    assert_eq!(labels, expected);
    Ok(())
}

#[tokio::test]
async fn test_listeners_see_age_pass_deletions() -> Result<()> {
    init_test_logging();
    let listener = Arc::new(RecordingListener::new("recorder"));
    let ctx = CleanupTestContext::new().with_listener(listener.clone());

    let entity = EntityId::new("expired");
    ctx.repository.insert_history(
        &entity,
        15,
        Utc::now() - Duration::days(60),
        Duration::days(1),
    );

    ctx.run().await?;

    let calls = listener.calls();
    assert_eq!(calls.len(), 5);
    assert!(calls.iter().all(|c| c.entity == entity));
    let lengths: Vec<usize> = calls.iter().map(|c| c.history_len).collect();
    assert_eq!(lengths, vec![15, 14, 13, 12, 11]);
    Ok(())
}
