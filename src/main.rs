use std::process::ExitCode;

use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use chscan::config::{self, Config};
use chscan::metrics::metrics;
use chscan::ClusterRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let mut config = load_or_default_config();
    if let Some(host) = std::env::args().nth(1) {
        config.client.host = host;
    }

    info!(
        seed = %config.client.host,
        port = config.client.port,
        soft_check = config.scan.soft_check,
        timeout_ms = config.scan.timeout_ms,
        "Scanning ClickHouse cluster"
    );

    let registry = ClusterRegistry::from_config(&config);
    let scan = registry.connect().await?;

    for (node, verdict) in &scan.verdicts {
        if verdict.passed {
            info!(node = %node, "Node healthy");
        } else {
            let violations: Vec<_> = verdict.violations().map(|v| v.as_str()).collect();
            warn!(node = %node, violations = ?violations, "Node unhealthy");
        }
    }
    for (cluster, hosts) in &scan.topology.clusters {
        info!(
            cluster = %cluster,
            hosts = hosts.len(),
            shards = hosts.shard_count(),
            replicas = hosts.replica_count(),
            "Cluster"
        );
    }
    info!(tables = scan.topology.tables.len(), "Replicated tables");

    if !scan.is_healthy() {
        warn!(errors = %scan.error_summary(), "Cluster unhealthy");
    }

    if config.metrics.print {
        print!("{}", metrics().gather());
    }

    Ok(if scan.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_or_default_config() -> Config {
    // Try to load from config file
    let config_paths = ["config/chscan.toml", "chscan.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    Config::default()
}
