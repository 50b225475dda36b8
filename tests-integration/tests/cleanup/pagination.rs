//! Page boundaries, duplicates and entities that change under the scan.

use anyhow::Result;
use cleaner::config::VERSIONABLE_PREDICATE;
use cleaner::memory::EntitySnapshot;
use cleaner::store::StoreScope;
use cleaner::{EntityId, InMemoryRepository};
use std::sync::Arc;
use tests_integration::fixtures::{CleanupTestContext, EntityRemovingListener};
use tests_integration::generators::HistoryGenerator;
use tests_integration::init_test_logging;

use crate::completed;

fn skip_counts(ctx: &CleanupTestContext) -> Vec<usize> {
    ctx.repository
        .searches()
        .iter()
        .map(|search| search.skip_count)
        .collect()
}

#[tokio::test]
async fn test_exact_multiple_of_page_size_fetches_empty_page() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    HistoryGenerator::new("doc")
        .entities(10)
        .populate(&ctx.repository);

    let summary = completed(ctx.run().await?);

    assert_eq!(skip_counts(&ctx), vec![0, 5, 10]);
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.entities_attempted, 10);

    for search in ctx.repository.searches() {
        assert_eq!(search.query, VERSIONABLE_PREDICATE);
        assert_eq!(search.scope, StoreScope::default());
        assert!(search.max_items.is_none());
    }
    assert_eq!(ctx.repository.open_result_sets(), 0);
    Ok(())
}

#[tokio::test]
async fn test_single_full_page_fetches_empty_page() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    HistoryGenerator::new("doc")
        .entities(ctx.config.page_size)
        .populate(&ctx.repository);

    let summary = completed(ctx.run().await?);

    assert_eq!(skip_counts(&ctx), vec![0, 5]);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.entities_attempted, 5);
    Ok(())
}

#[tokio::test]
async fn test_short_page_ends_scan() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    HistoryGenerator::new("doc")
        .entities(7)
        .populate(&ctx.repository);

    let summary = completed(ctx.run().await?);

    assert_eq!(skip_counts(&ctx), vec![0, 5]);
    assert_eq!(summary.pages, 2);
    Ok(())
}

#[tokio::test]
async fn test_empty_repository() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();

    let summary = completed(ctx.run().await?);

    assert_eq!(skip_counts(&ctx), vec![0]);
    assert_eq!(summary.entities_attempted, 0);
    assert_eq!(summary.revisions_deleted, 0);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_results_are_processed_once() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    let ids = HistoryGenerator::new("doc")
        .entities(3)
        .revisions(52)
        .populate(&ctx.repository);
    ctx.repository.duplicate_in_search(&ids[0]);

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.entities_attempted, 3);
    assert_eq!(summary.revisions_deleted, 6);
    assert_eq!(ctx.revision_count(&ids[0]), 50);
    Ok(())
}

#[tokio::test]
async fn test_entity_removed_mid_page_is_skipped() -> Result<()> {
    init_test_logging();
    let base = CleanupTestContext::new();
    let ids = HistoryGenerator::new("doc")
        .entities(3)
        .revisions(52)
        .populate(&base.repository);
    let listener = Arc::new(EntityRemovingListener::new(
        base.repository.clone(),
        ids[1].clone(),
    ));
    let config = base.config.clone().with_worker_count(1);
    let ctx = base.with_config(config).with_listener(listener);

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.entities_attempted, 3);
    assert_eq!(summary.entities_skipped, 1);
    assert_eq!(summary.entities_failed, 0);
    assert_eq!(summary.revisions_deleted, 4);
    assert_eq!(ctx.revision_count(&ids[2]), 50);
    Ok(())
}

#[tokio::test]
async fn test_unversioned_entity_is_skipped() -> Result<()> {
    init_test_logging();
    let ctx = CleanupTestContext::new();
    ctx.repository
        .insert_entity(EntityId::new("folder"), VERSIONABLE_PREDICATE);
    let ids = HistoryGenerator::new("doc")
        .revisions(51)
        .populate(&ctx.repository);

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.entities_attempted, 2);
    assert_eq!(summary.entities_skipped, 1);
    assert_eq!(ctx.revision_count(&ids[0]), 50);
    Ok(())
}

#[tokio::test]
async fn test_search_limiter_narrows_candidates() -> Result<()> {
    init_test_logging();
    let mut snapshot = HistoryGenerator::new("doc")
        .entities(4)
        .revisions(52)
        .snapshot();
    let in_sites = format!("{VERSIONABLE_PREDICATE} PATH:\"/sites\"");
    for entity in snapshot.entities.iter_mut().take(2) {
        entity.index = in_sites.clone();
    }
    let ids: Vec<EntityId> = snapshot
        .entities
        .iter()
        .map(|entity: &EntitySnapshot| entity.id.clone())
        .collect();

    let base = CleanupTestContext::with_repository(InMemoryRepository::from_snapshot(snapshot));
    let config = base
        .config
        .clone()
        .with_search_limiter(" AND PATH:\"/sites\"");
    let ctx = base.with_config(config);

    let summary = completed(ctx.run().await?);

    assert_eq!(summary.entities_attempted, 2);
    assert_eq!(summary.revisions_deleted, 4);
    assert_eq!(ctx.revision_count(&ids[0]), 50);
    assert_eq!(ctx.revision_count(&ids[3]), 52);
    assert_eq!(
        ctx.repository.searches()[0].query,
        format!("{VERSIONABLE_PREDICATE} AND PATH:\"/sites\"")
    );
    Ok(())
}
