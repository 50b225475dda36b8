use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file, looked up in the working directory.
pub const CONFIG_FILE: &str = "revclean.toml";

/// Prefix of environment variable overrides, e.g.
/// `REVCLEAN__CLEANER__MAX_VERSIONS_TO_KEEP=20`.
pub const ENV_PREFIX: &str = "REVCLEAN__";

/// Configuration of the revision cleaner
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Whether the cleaner runs at all
    pub enabled: bool,
    /// Hard upper bound on the number of revisions kept per entity
    pub max_versions_to_keep: i32,
    /// Number of newest revisions never removed because of their age
    pub min_versions_to_keep: i32,
    /// Age in days past which revisions beyond `min_versions_to_keep` are deleted
    pub max_days_to_keep: i32,
    /// Number of candidate entities fetched per page
    pub page_size: usize,
    /// Number of concurrent workers per page
    pub worker_count: usize,
    /// Query fragment appended to the versionable predicate, e.g.
    /// ` AND PATH:"/app:company_home/st:sites//*"`
    pub search_limiter: Option<String>,
    /// Log what would be deleted without deleting anything
    pub dry_run: bool,
    /// Name of the cluster-wide run lock
    pub lock_name: String,
    /// Time-to-live of the run lock
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,
    /// Protocol of the store searched for candidates
    pub store_protocol: String,
    /// Identifier of the store searched for candidates
    pub store_identifier: String,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_versions_to_keep: 50,
            min_versions_to_keep: 10,
            max_days_to_keep: 365 * 15,
            page_size: 50_000,
            worker_count: 2,
            search_limiter: None,
            dry_run: false,
            lock_name: "revision-cleaner".to_string(),
            lock_ttl: Duration::from_secs(2 * 60 * 60),
            store_protocol: "workspace".to_string(),
            store_identifier: "SpacesStore".to_string(),
        }
    }
}

impl CleanerConfig {
    /// Store scope in `<protocol>://<identifier>` form
    pub fn store_scope(&self) -> String {
        format!("{}://{}", self.store_protocol, self.store_identifier)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Revision cleaner configuration
    #[serde(default)]
    pub cleaner: CleanerConfig,
}

impl Configuration {
    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load from `revclean.toml` in the working directory (if present) and
    /// `REVCLEAN__*` environment variables.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Path::new(CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    /// Load from an explicit file path, still honouring environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }
}
