//! Retention bounds for revision histories.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;

/// Count- and age-based retention bounds.
///
/// A revision is deleted if it is older than the `max_versions_to_keep`'th
/// newest revision, or if it is older than the `min_versions_to_keep`'th
/// newest revision and older than `max_days_to_keep` days.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Hard upper bound on the number of revisions kept.
    ///
    /// Env: REVCLEAN__CLEANER__MAX_VERSIONS_TO_KEEP
    #[serde(default = "default_max_versions_to_keep")]
    pub max_versions_to_keep: i32,

    /// Number of newest revisions never removed by the age pass.
    ///
    /// Env: REVCLEAN__CLEANER__MIN_VERSIONS_TO_KEEP
    #[serde(default = "default_min_versions_to_keep")]
    pub min_versions_to_keep: i32,

    /// Age cutoff in days. Zero or negative puts the cutoff at "now".
    ///
    /// Env: REVCLEAN__CLEANER__MAX_DAYS_TO_KEEP
    #[serde(default = "default_max_days_to_keep")]
    pub max_days_to_keep: i32,
}

fn default_max_versions_to_keep() -> i32 {
    50
}

fn default_min_versions_to_keep() -> i32 {
    10
}

fn default_max_days_to_keep() -> i32 {
    365 * 15 // approx. 15 years
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_versions_to_keep: default_max_versions_to_keep(),
            min_versions_to_keep: default_min_versions_to_keep(),
            max_days_to_keep: default_max_days_to_keep(),
        }
    }
}

impl RetentionConfig {
    /// Validate the retention bounds.
    ///
    /// Checks:
    /// - Both counts are zero or greater
    /// - `min_versions_to_keep` does not exceed `max_versions_to_keep`
    ///
    /// Legal but destructive settings are reported as warnings.
    pub fn validate(&self) -> Result<Vec<RetentionWarning>, ConfigError> {
        if self.max_versions_to_keep < 0 {
            return Err(ConfigError::NegativeVersionCount {
                field: "max_versions_to_keep",
                value: self.max_versions_to_keep,
            });
        }
        if self.min_versions_to_keep < 0 {
            return Err(ConfigError::NegativeVersionCount {
                field: "min_versions_to_keep",
                value: self.min_versions_to_keep,
            });
        }
        if self.min_versions_to_keep > self.max_versions_to_keep {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_versions_to_keep,
                max: self.max_versions_to_keep,
            });
        }

        let mut warnings = Vec::new();
        if self.max_versions_to_keep == 0 && self.min_versions_to_keep == 0 {
            warnings.push(RetentionWarning::DeletesEntireHistory);
        }
        if self.max_days_to_keep <= 0 {
            warnings.push(RetentionWarning::NoAgeProtection {
                max_days_to_keep: self.max_days_to_keep,
            });
        }
        Ok(warnings)
    }
}

/// Legal configurations that will delete more than an operator may expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionWarning {
    /// `max_versions_to_keep` and `min_versions_to_keep` are both zero.
    DeletesEntireHistory,
    /// Every revision past `min_versions_to_keep` is old enough to delete.
    NoAgeProtection { max_days_to_keep: i32 },
}

impl fmt::Display for RetentionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionWarning::DeletesEntireHistory => write!(
                f,
                "max_versions_to_keep and min_versions_to_keep are both 0: every revision history found will be deleted"
            ),
            RetentionWarning::NoAgeProtection { max_days_to_keep } => write!(
                f,
                "max_days_to_keep is {max_days_to_keep}: all revisions beyond min_versions_to_keep are eligible for deletion"
            ),
        }
    }
}
