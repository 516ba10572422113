use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Connection settings for the seed host
    #[serde(default)]
    pub client: ClientConfig,
    /// Scan behaviour and health policy
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ============================================================================
// Client Configuration
// ============================================================================

/// Connection settings shared by every node of the cluster
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Seed hostname; expanded into the node list on first scan
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP interface port
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Default request timeout (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Default connect timeout (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8123
}

fn default_user() -> String {
    "default".to_string()
}

fn default_database() -> String {
    "default".to_string()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

// ============================================================================
// Scan Configuration
// ============================================================================

/// Scan configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Explicit node list; skips DNS expansion of the seed host when set
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Request and connect timeout for every probe (milliseconds)
    #[serde(default = "default_scan_timeout_ms")]
    pub timeout_ms: u64,
    /// Query the cheap column set and stop at the first failing replica
    #[serde(default = "default_soft_check")]
    pub soft_check: bool,
    /// Verdict for a node that reports no replicated tables
    #[serde(default)]
    pub zero_replicas: ZeroReplicaPolicy,
    /// Timeout applied to TRUNCATE on each leader (milliseconds)
    #[serde(default = "default_truncate_timeout_ms")]
    pub truncate_timeout_ms: u64,
    #[serde(default)]
    pub thresholds: HealthThresholds,
}

fn default_scan_timeout_ms() -> u64 {
    10_000
}

fn default_soft_check() -> bool {
    true
}

fn default_truncate_timeout_ms() -> u64 {
    2000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            timeout_ms: default_scan_timeout_ms(),
            soft_check: default_soft_check(),
            zero_replicas: ZeroReplicaPolicy::default(),
            truncate_timeout_ms: default_truncate_timeout_ms(),
            thresholds: HealthThresholds::default(),
        }
    }
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn truncate_timeout(&self) -> Duration {
        Duration::from_millis(self.truncate_timeout_ms)
    }
}

/// What a node without any replica rows counts as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ZeroReplicaPolicy {
    /// Unhealthy; non-replicated deployments always fail
    #[default]
    Fail,
    Pass,
}

/// Limits applied to `system.replicas` counters
#[derive(Debug, Clone, Deserialize)]
pub struct HealthThresholds {
    #[serde(default = "default_max_future_parts")]
    pub max_future_parts: u64,
    #[serde(default = "default_max_parts_to_check")]
    pub max_parts_to_check: u64,
    /// Strict mode only
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: u64,
    /// Strict mode only: allowed `log_max_index - log_pointer`
    #[serde(default = "default_max_log_lag")]
    pub max_log_lag: u64,
}

fn default_max_future_parts() -> u64 {
    20
}

fn default_max_parts_to_check() -> u64 {
    10
}

fn default_max_queue_size() -> u64 {
    20
}

fn default_max_log_lag() -> u64 {
    10
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_future_parts: default_max_future_parts(),
            max_parts_to_check: default_max_parts_to_check(),
            max_queue_size: default_max_queue_size(),
            max_log_lag: default_max_log_lag(),
        }
    }
}

// ============================================================================
// Metrics Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Print Prometheus text after the scan
    #[serde(default)]
    pub print: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[client]
host = "ch.cluster.local"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.client.host, "ch.cluster.local");
        assert_eq!(config.client.port, 8123); // default
        assert_eq!(config.client.user, "default");
        assert!(config.scan.soft_check); // default
        assert_eq!(config.scan.timeout_ms, 10_000);
        assert!(!config.metrics.print);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.client.host, "127.0.0.1");
        assert_eq!(config.scan.zero_replicas, ZeroReplicaPolicy::Fail);
    }

    #[test]
    fn test_parse_config_with_scan() {
        let toml = r#"
[client]
host = "ch.cluster.local"
port = 8443
user = "monitor"
password = "secret"
database = "metrics"

[scan]
nodes = ["10.0.0.1", "10.0.0.2"]
timeout_ms = 3000
soft_check = false
zero_replicas = "pass"
truncate_timeout_ms = 5000

[scan.thresholds]
max_future_parts = 50
max_log_lag = 100
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.client.port, 8443);
        assert_eq!(config.client.password, "secret");
        assert_eq!(config.client.database, "metrics");
        assert!(!config.scan.soft_check);
        assert_eq!(config.scan.nodes, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(config.scan.timeout(), Duration::from_secs(3));
        assert_eq!(config.scan.truncate_timeout(), Duration::from_secs(5));
        assert_eq!(config.scan.zero_replicas, ZeroReplicaPolicy::Pass);
        assert_eq!(config.scan.thresholds.max_future_parts, 50);
        assert_eq!(config.scan.thresholds.max_parts_to_check, 10); // default
        assert_eq!(config.scan.thresholds.max_log_lag, 100);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let toml = r#"
[scan]
zero_replicas = "maybe"
"#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_threshold_defaults() {
        let t = HealthThresholds::default();
        assert_eq!(t.max_future_parts, 20);
        assert_eq!(t.max_parts_to_check, 10);
        assert_eq!(t.max_queue_size, 20);
        assert_eq!(t.max_log_lag, 10);
    }
}
