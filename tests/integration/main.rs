//! Integration test entry point
//!
//! Run with: CHSCAN_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Environment variables:
//! - CHSCAN_RUN_INTEGRATION_TESTS: Set to "1" to enable integration tests
//! - CHSCAN_TEST_HOST: Seed host (default: 127.0.0.1)
//! - CHSCAN_TEST_PORT: HTTP port (default: 8123)
//! - CHSCAN_TEST_USER: User (default: default)
//! - CHSCAN_TEST_PASS: Password (default: empty)
//! - CHSCAN_TEST_CLUSTER: Cluster name expected in system.clusters (optional)

mod scan;

use std::env;

use chscan::config::Config;
use chscan::ClusterRegistry;

/// Check if integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("CHSCAN_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if integration tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!("Skipping integration test (set CHSCAN_RUN_INTEGRATION_TESTS=1 to run)");
            return;
        }
    };
}

/// Scanner config pointing at the test server
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.client.host = env::var("CHSCAN_TEST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    config.client.port = env::var("CHSCAN_TEST_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8123);
    config.client.user = env::var("CHSCAN_TEST_USER").unwrap_or_else(|_| "default".to_string());
    config.client.password = env::var("CHSCAN_TEST_PASS").unwrap_or_default();
    config.scan.zero_replicas = chscan::config::ZeroReplicaPolicy::Pass;
    config
}

/// Expected cluster name, when the server defines one
pub fn test_cluster() -> Option<String> {
    env::var("CHSCAN_TEST_CLUSTER").ok().filter(|c| !c.is_empty())
}

pub fn registry() -> ClusterRegistry {
    ClusterRegistry::from_config(&test_config())
}
