//! Transactions retried on concurrency conflicts.

use anyhow::Result;
use cleaner::InMemoryRepository;
use tests_integration::fixtures::CleanupTestContext;
use tests_integration::generators::HistoryGenerator;
use tests_integration::init_test_logging;

use crate::completed;

#[tokio::test]
async fn test_conflicts_are_retried() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    let ids = HistoryGenerator::new("doc")
        .revisions(54)
        .populate(&ctx.repository);
    ctx.repository.inject_conflicts(&ids[0], 2);

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.entities_failed, 0);
    assert_eq!(summary.revisions_deleted, 4);
    assert_eq!(ctx.revision_count(&ids[0]), 50);
    assert_eq!(ctx.repository.rolled_back_transactions(), 2);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_entity() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    let ids = HistoryGenerator::new("doc")
        .entities(2)
        .revisions(54)
        .populate(&ctx.repository);
    ctx.repository.inject_conflicts(&ids[0], 3);

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.entities_failed, 1);
    assert_eq!(ctx.revision_count(&ids[0]), 54);
    assert_eq!(ctx.revision_count(&ids[1]), 50);
    Ok(())
}

#[tokio::test]
async fn test_more_attempts_absorb_more_conflicts() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::with_repository(InMemoryRepository::new().with_max_attempts(5));
    let ids = HistoryGenerator::new("doc")
        .revisions(54)
        .populate(&ctx.repository);
    ctx.repository.inject_conflicts(&ids[0], 4);

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.entities_failed, 0);
    assert_eq!(ctx.revision_count(&ids[0]), 50);
    Ok(())
}
