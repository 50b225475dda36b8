//! Retention rules for revision histories.
//!
//! - `config`: Count and age bounds with serde support for TOML/env vars
//! - `policy`: The two-pass selection of revisions to delete
//!
//! ## Usage
//!
//! ```
//! use chrono::{Duration, Utc};
//! use cleaner::model::{EntityId, Revision, RevisionHistory};
//! use cleaner::retention::{RetentionConfig, select_for_deletion};
//!
//! let now = Utc::now();
//! let entity = EntityId::new("doc");
//! let history = RevisionHistory::new(
//!     entity.clone(),
//!     (0..5)
//!         .map(|i| Revision::new(entity.clone(), format!("1.{i}"), now - Duration::days(i)))
//!         .collect(),
//! );
//! let config = RetentionConfig {
//!     max_versions_to_keep: 3,
//!     min_versions_to_keep: 1,
//!     max_days_to_keep: 30,
//! };
//!
//! let deleted = select_for_deletion(&history, &config, now)?;
//! assert_eq!(deleted.len(), 2);
//! # Ok::<(), cleaner::config::ConfigError>(())
//! ```

pub mod config;
pub mod policy;

pub use config::{RetentionConfig, RetentionWarning};
pub use policy::{RetentionPolicy, compute_cutoff, select_for_deletion};
