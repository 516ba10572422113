//! Live scan tests
//!
//! Run against a single server or a real cluster; replicated tables are
//! optional, so node verdicts use the passing zero-replica policy.

use std::time::Duration;

use chscan::ClusterError;

use crate::{registry, skip_if_not_enabled, test_cluster, test_config};

#[tokio::test]
async fn test_scan_reaches_every_node() {
    skip_if_not_enabled!();

    let registry = registry();
    let scan = registry.connect().await.expect("scan failed");
    assert!(!scan.nodes.is_empty());
    assert!(
        scan.bad_nodes.is_empty(),
        "unreachable nodes: {:?}",
        scan.bad_nodes
    );
    assert_eq!(scan.verdicts.len(), scan.nodes.len());
}

#[tokio::test]
async fn test_strict_scan() {
    skip_if_not_enabled!();

    let registry = registry();
    registry.set_soft_check(false);
    let scan = registry.connect().await.expect("scan failed");
    assert!(!scan.soft_check);
    assert!(scan.bad_nodes.is_empty(), "bad nodes: {:?}", scan.bad_nodes);
}

#[tokio::test]
async fn test_cluster_topology() {
    skip_if_not_enabled!();

    let Some(cluster) = test_cluster() else {
        eprintln!("CHSCAN_TEST_CLUSTER not set, skipping topology checks");
        return;
    };
    let registry = registry();
    assert!(registry.cluster_list().await.unwrap().contains(&cluster));
    assert!(registry.cluster_count_shard(&cluster).await.unwrap() >= 1);
    assert!(registry.cluster_count_replica(&cluster).await.unwrap() >= 1);
    assert!(!registry.cluster_nodes(&cluster).await.unwrap().is_empty());

    let handle = registry.client_like(&cluster, "no-such-host").await.unwrap();
    assert_eq!(
        handle.node(),
        registry.cluster_nodes(&cluster).await.unwrap()[0]
    );
}

#[tokio::test]
async fn test_unknown_names() {
    skip_if_not_enabled!();

    let registry = registry();
    assert!(matches!(
        registry.cluster_nodes("chscan_missing_cluster").await,
        Err(ClusterError::NotFound { .. })
    ));
    assert!(matches!(
        registry.nodes_by_table("chscan_missing.table").await,
        Err(ClusterError::NotFound { .. })
    ));
    assert_eq!(registry.size_table("chscan_missing.table").await.unwrap(), None);
}

#[tokio::test]
async fn test_active_client_select() {
    skip_if_not_enabled!();

    let registry = registry();
    let handle = registry.active_client().await.unwrap();
    handle.set_timeout(Duration::from_secs(5));
    let rows = handle.select("SELECT 1 AS one").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains_key("one"));
}

#[tokio::test]
async fn test_unreachable_seed() {
    skip_if_not_enabled!();

    let mut config = test_config();
    config.client.port = 1;
    config.scan.timeout_ms = 500;
    let registry = chscan::ClusterRegistry::from_config(&config);
    assert!(!registry.is_replicas_ok().await.unwrap());
    assert!(!registry.bad_nodes().await.unwrap().is_empty());
}
