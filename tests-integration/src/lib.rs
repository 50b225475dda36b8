/// Common test utilities and helpers for integration tests
use cleaner::CleanupConfig;
use common::config::Configuration;
use std::time::Duration;

pub mod fixtures;
pub mod generators;

/// Create a test configuration sized for small in-memory repositories
pub fn create_test_config() -> Configuration {
    let mut config = Configuration::default();

    config.cleaner.page_size = 5;
    config.cleaner.worker_count = 2;
    config.cleaner.max_days_to_keep = 30;
    config.cleaner.lock_name = "revision-cleaner-test".to_string();
    config.cleaner.lock_ttl = Duration::from_secs(60);

    config
}

/// Cleanup configuration derived from [`create_test_config`]
pub fn create_cleanup_config() -> CleanupConfig {
    CleanupConfig::from(&create_test_config().cleaner)
}

/// Initialize test logging
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
