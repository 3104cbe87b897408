//! Scenario tests that run the relay end to end, plus shared fixtures for
//! the other test modules.

mod integration_test;

use tempfile::TempDir;

use crate::app::{Services, bootstrap};
use crate::config::Settings;

/// Settings pointing at a fresh temporary store, tuned for fast tests.
pub(crate) fn test_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.store.data_dir = dir.path().join("db").to_string_lossy().into_owned();
    settings.store.bootstrap_attempts = 1;
    settings.log.poll_interval_ms = 20;
    settings.consumer.retry_backoff_ms = 10;
    settings
}

pub(crate) async fn test_services_with(settings: Settings) -> Services {
    bootstrap(settings).await.expect("bootstrap failed")
}

pub(crate) async fn test_services() -> (Services, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let services = test_services_with(test_settings(&dir)).await;
    (services, dir)
}
