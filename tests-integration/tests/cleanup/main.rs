//! End-to-end cleanup runs against the in-memory repository.

mod conflicts;
mod dry_run;
mod failure_isolation;
mod listeners;
mod lock_contention;
mod pagination;
mod run_completion;
mod shutdown;

use cleaner::{JobOutcome, RunSummary};

/// Summary of a run that reached the end of its scan
pub fn completed(outcome: JobOutcome) -> RunSummary {
    match outcome {
        JobOutcome::Completed(summary) => summary,
        other => panic!("expected a completed run, got {other:?}"),
    }
}
