//! Paginated scan over the candidate entities.
//!
//! Pages are fetched at offsets `0, page_size, 2 * page_size, ...` and each
//! page is purged completely before the next one is fetched. Between pages
//! the run lock is refreshed and the cancellation signal is checked. The scan
//! ends when a page comes back shorter than `page_size`.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{BatchCoordinator, BatchReport};
use crate::error::{CleanupError, StoreResult};
use crate::lock::RunLock;
use crate::metrics::CleanupMetrics;
use crate::model::EntityId;
use crate::retention::RetentionPolicy;
use crate::store::{
    QueryLanguage, SearchParameters, SearchService, StoreScope, TransactionService, UnitOfWork,
};

/// How a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A page shorter than `page_size` was reached.
    EndOfData,
    /// Shutdown was requested between two pages.
    Aborted,
    /// An unexpected error stopped the scan; entities past `offset` were not
    /// visited.
    TerminatedEarly { offset: usize, reason: String },
}

/// Totals accumulated over a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub outcome: ScanOutcome,
    pub pages: usize,
    pub entities_attempted: usize,
    pub entities_skipped: usize,
    pub entities_failed: usize,
    pub revisions_deleted: usize,
    pub revisions_selected: usize,
}

impl Default for ScanSummary {
    fn default() -> Self {
        Self {
            outcome: ScanOutcome::EndOfData,
            pages: 0,
            entities_attempted: 0,
            entities_skipped: 0,
            entities_failed: 0,
            revisions_deleted: 0,
            revisions_selected: 0,
        }
    }
}

impl ScanSummary {
    fn absorb(&mut self, report: &BatchReport) {
        self.entities_attempted += report.attempted;
        self.entities_skipped += report.skipped;
        self.entities_failed += report.failed();
        self.revisions_deleted += report.revisions_deleted;
        self.revisions_selected += report.revisions_selected;
    }
}

/// One page of candidates.
#[derive(Debug, Default, Clone)]
struct Page {
    /// Number of results the search returned, duplicates included.
    fetched: usize,
    /// Distinct ids in search order.
    entities: Vec<EntityId>,
}

/// Drives the page loop of a cleanup run.
pub struct PageScanner {
    search: Arc<dyn SearchService>,
    transactions: Arc<dyn TransactionService>,
    coordinator: BatchCoordinator,
    scope: StoreScope,
    query: String,
    page_size: usize,
    cancellation: CancellationToken,
    metrics: CleanupMetrics,
}

impl PageScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        search: Arc<dyn SearchService>,
        transactions: Arc<dyn TransactionService>,
        coordinator: BatchCoordinator,
        scope: StoreScope,
        query: impl Into<String>,
        page_size: usize,
        cancellation: CancellationToken,
        metrics: CleanupMetrics,
    ) -> Self {
        Self {
            search,
            transactions,
            coordinator,
            scope,
            query: query.into(),
            page_size: page_size.max(1),
            cancellation,
            metrics,
        }
    }

    /// Scan every page, purging each one before fetching the next.
    ///
    /// Never fails: shutdown and unexpected errors end the scan and are
    /// reported through [`ScanSummary::outcome`].
    pub async fn scan(&self, lock: &mut RunLock, policy: &RetentionPolicy) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let mut offset = 0;

        let result = self.scan_pages(lock, policy, &mut offset, &mut summary).await;
        summary.outcome = match result {
            Ok(()) => ScanOutcome::EndOfData,
            Err(CleanupError::ShutdownRequested) => {
                debug!(offset, "Shutdown requested, stopping scan");
                ScanOutcome::Aborted
            }
            Err(e) => {
                warn!(
                    offset,
                    error = %e,
                    "Scan terminated early, entities from this offset on were not processed"
                );
                ScanOutcome::TerminatedEarly {
                    offset,
                    reason: e.to_string(),
                }
            }
        };
        summary
    }

    async fn scan_pages(
        &self,
        lock: &mut RunLock,
        policy: &RetentionPolicy,
        offset: &mut usize,
        summary: &mut ScanSummary,
    ) -> Result<(), CleanupError> {
        loop {
            lock.refresh().await?;

            if self.cancellation.is_cancelled() {
                return Err(CleanupError::ShutdownRequested);
            }

            let page = self.fetch_page(*offset).await?;
            summary.pages += 1;
            self.metrics.record_page_scanned();

            info!(
                offset = *offset,
                entities = page.entities.len(),
                "Processing page of versioned entities"
            );

            let report = self
                .coordinator
                .process(page.entities, policy, *offset)
                .await?;
            summary.absorb(&report);

            if page.fetched < self.page_size {
                return Ok(());
            }
            *offset += self.page_size;
        }
    }

    async fn fetch_page(&self, offset: usize) -> Result<Page, CleanupError> {
        let query = PageQuery {
            search: self.search.as_ref(),
            params: SearchParameters {
                scope: self.scope.clone(),
                language: QueryLanguage::FullText,
                query: self.query.clone(),
                skip_count: offset,
                max_items: None,
            },
            page_size: self.page_size,
            page: Mutex::new(Page::default()),
        };

        self.transactions
            .run_in_transaction(&query, true)
            .await
            .map_err(|source| CleanupError::PageFetch { offset, source })?;

        Ok(query
            .page
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

/// Read-only unit of work fetching one page of candidate ids. The search is
/// unbounded; only the first `page_size` results are read.
struct PageQuery<'a> {
    search: &'a dyn SearchService,
    params: SearchParameters,
    page_size: usize,
    page: Mutex<Page>,
}

#[async_trait]
impl UnitOfWork for PageQuery<'_> {
    async fn execute(&self) -> StoreResult<()> {
        let results = self.search.query(&self.params).await?;

        let fetched = results.len().min(self.page_size);
        let mut seen = HashSet::with_capacity(fetched);
        let mut entities = Vec::with_capacity(fetched);
        for index in 0..fetched {
            if let Some(entity) = results.entity_id(index) {
                if seen.insert(entity.clone()) {
                    entities.push(entity);
                }
            }
        }
        results.close();

        *self
            .page
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Page { fetched, entities };
        Ok(())
    }
}
