//! Fan-out probing of every node
//!
//! Each node gets two queries, `system.replicas` and `system.clusters`, sent
//! concurrently with every other node's. A slow or dead node only costs its
//! own probes: failures are captured per node and never abort the scan.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::{decode_rows, HostGuard, ProbeClient, ProbeError, RequestOptions};
use crate::health::ReplicaHealthEvaluator;
use crate::metrics::metrics;

use super::result::{NodeProbe, ScanResult};
use super::rows::{ClusterRow, ReplicaRow};

/// Cheap replica probe: skips `log_max_index`, `log_pointer`, `total_replicas`
/// and `active_replicas`, each of which costs a coordination-service read per row.
pub const SOFT_REPLICAS_QUERY: &str = "SELECT database,table,engine,is_leader,is_readonly,is_session_expired,future_parts,parts_to_check,zookeeper_path,replica_name,replica_path,columns_version,queue_size,inserts_in_queue,merges_in_queue,queue_oldest_time,inserts_oldest_time,merges_oldest_time FROM system.replicas";

pub const STRICT_REPLICAS_QUERY: &str = "SELECT * FROM system.replicas";

pub const CLUSTERS_QUERY: &str = "SELECT * FROM system.clusters";

pub fn replicas_query(soft_check: bool) -> &'static str {
    if soft_check {
        SOFT_REPLICAS_QUERY
    } else {
        STRICT_REPLICAS_QUERY
    }
}

/// Probes all nodes concurrently through one shared client
pub struct ConcurrentProber {
    client: Arc<dyn ProbeClient>,
}

impl ConcurrentProber {
    pub fn new(client: Arc<dyn ProbeClient>) -> Self {
        Self { client }
    }

    /// Probe every node and build the scan result
    pub async fn probe(
        &self,
        nodes: &[String],
        timeout: Duration,
        soft_check: bool,
        evaluator: &ReplicaHealthEvaluator,
    ) -> ScanResult {
        let started = Instant::now();
        let probes = self.probe_nodes(nodes, timeout, soft_check).await;
        let result = ScanResult::build(probes, evaluator, soft_check, started.elapsed());
        metrics().record_scan(&result);
        result
    }

    /// Raw per-node results, in the order of `nodes`
    pub async fn probe_nodes(
        &self,
        nodes: &[String],
        timeout: Duration,
        soft_check: bool,
    ) -> Vec<NodeProbe> {
        // Whatever happens below, the client's default host is put back.
        let _restore = HostGuard::capture(self.client.as_ref());

        debug!(nodes = nodes.len(), timeout_ms = timeout.as_millis() as u64, soft_check, "Probing nodes");
        join_all(nodes.iter().map(|node| self.probe_node(node, timeout, soft_check))).await
    }

    async fn probe_node(&self, node: &str, timeout: Duration, soft_check: bool) -> NodeProbe {
        let options = RequestOptions {
            host: Some(node.to_string()),
            timeout: Some(timeout),
            connect_timeout: Some(timeout),
            pin_address: true,
        };

        let (replicas, clusters) = tokio::join!(
            self.fetch::<ReplicaRow>(node, replicas_query(soft_check), &options),
            self.fetch::<ClusterRow>(node, CLUSTERS_QUERY, &options),
        );

        if let Err(e) = &replicas {
            metrics().record_probe_error("replicas", e.kind());
        }
        if let Err(e) = &clusters {
            metrics().record_probe_error("clusters", e.kind());
        }
        if let (Ok(r), Ok(c)) = (&replicas, &clusters) {
            debug!(node = %node, replicas = r.len(), cluster_rows = c.len(), "Node probed");
        }

        NodeProbe {
            node: node.to_string(),
            replicas,
            clusters,
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        node: &str,
        sql: &str,
        options: &RequestOptions,
    ) -> Result<Vec<T>, ProbeError> {
        let timeout = options.timeout.unwrap_or_else(|| self.client.timeout());
        let rows = match tokio::time::timeout(timeout, self.client.select(sql, options)).await {
            Ok(rows) => rows?,
            Err(_) => {
                return Err(ProbeError::Timeout {
                    host: node.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };
        decode_rows(node, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{row, MockProbeClient};
    use serde_json::json;

    fn replica(table: &str) -> crate::client::Row {
        row(json!({
            "database": "db", "table": table, "is_leader": 1,
            "is_readonly": 0, "is_session_expired": 0,
            "future_parts": 0, "parts_to_check": 0, "queue_size": 0
        }))
    }

    fn cluster(host: &str) -> crate::client::Row {
        row(json!({
            "cluster": "main", "shard_num": 1, "shard_weight": 1, "replica_num": 1,
            "host_name": host, "host_address": host, "port": 9000, "is_local": 0
        }))
    }

    fn healthy_node(client: &MockProbeClient, node: &str, soft: bool) {
        client.respond(node, replicas_query(soft), vec![replica("events")]);
        client.respond(node, CLUSTERS_QUERY, vec![cluster(node)]);
    }

    #[test]
    fn test_query_texts() {
        assert_eq!(replicas_query(false), "SELECT * FROM system.replicas");
        assert!(replicas_query(true).starts_with("SELECT database,table,engine,is_leader,"));
        assert!(!replicas_query(true).contains("log_pointer"));
        assert!(!replicas_query(true).contains("active_replicas"));
    }

    #[tokio::test]
    async fn test_probe_sends_both_queries_with_scan_options() {
        let client = Arc::new(MockProbeClient::new("seed"));
        healthy_node(&client, "10.0.0.1", false);
        let prober = ConcurrentProber::new(client.clone());

        let probes = prober
            .probe_nodes(&["10.0.0.1".to_string()], Duration::from_secs(3), false)
            .await;
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].replicas.as_ref().unwrap().len(), 1);

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.host == "10.0.0.1"));
        assert!(calls.iter().all(|c| c.timeout == Duration::from_secs(3)));
        assert!(calls.iter().all(|c| c.pinned));
        assert!(calls.iter().any(|c| c.sql == STRICT_REPLICAS_QUERY));
        assert!(calls.iter().any(|c| c.sql == CLUSTERS_QUERY));
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_node() {
        let client = Arc::new(MockProbeClient::new("seed"));
        healthy_node(&client, "a", true);
        client.unreachable("b", SOFT_REPLICAS_QUERY);
        client.unreachable("b", CLUSTERS_QUERY);
        client.respond("c", SOFT_REPLICAS_QUERY, vec![replica("events")]);
        client.fail_query("c", CLUSTERS_QUERY, "ACCESS_DENIED");
        let prober = ConcurrentProber::new(client.clone());

        let nodes: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let probes = prober.probe_nodes(&nodes, Duration::from_secs(1), true).await;

        assert_eq!(probes.iter().map(|p| p.node.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(probes[0].replicas.is_ok() && probes[0].clusters.is_ok());
        assert!(probes[1].replicas.as_ref().unwrap_err().is_transport());
        assert!(probes[2].replicas.is_ok());
        assert!(matches!(probes[2].clusters, Err(ProbeError::Query { .. })));
    }

    #[tokio::test]
    async fn test_slow_node_times_out_alone() {
        let client = Arc::new(MockProbeClient::new("seed"));
        healthy_node(&client, "fast", true);
        healthy_node(&client, "slow", true);
        client.delay("slow", Duration::from_secs(30));
        let prober = ConcurrentProber::new(client.clone());

        let nodes = vec!["fast".to_string(), "slow".to_string()];
        let started = Instant::now();
        let probes = prober.probe_nodes(&nodes, Duration::from_millis(50), true).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(probes[0].replicas.is_ok());
        assert!(matches!(probes[1].replicas, Err(ProbeError::Timeout { timeout_ms: 50, .. })));
        assert!(matches!(probes[1].clusters, Err(ProbeError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_malformed_rows_fail_the_node() {
        let client = Arc::new(MockProbeClient::new("seed"));
        client.respond("a", SOFT_REPLICAS_QUERY, vec![row(json!({"database": "db"}))]);
        client.respond("a", CLUSTERS_QUERY, vec![cluster("a")]);
        let prober = ConcurrentProber::new(client.clone());

        let probes = prober.probe_nodes(&["a".to_string()], Duration::from_secs(1), true).await;
        assert!(matches!(probes[0].replicas, Err(ProbeError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_default_host_restored_after_scan() {
        // a client that rebinds its default host to every node it talks to
        let client = Arc::new(MockProbeClient::rebinding("seed.cluster"));
        healthy_node(&client, "a", true);
        client.unreachable("b", SOFT_REPLICAS_QUERY);
        client.unreachable("b", CLUSTERS_QUERY);
        let prober = ConcurrentProber::new(client.clone());

        let nodes = vec!["a".to_string(), "b".to_string()];
        let result = prober
            .probe(&nodes, Duration::from_secs(1), true, &ReplicaHealthEvaluator::default())
            .await;
        assert!(!result.is_healthy());
        assert_eq!(client.host(), "seed.cluster");
    }

    #[tokio::test]
    async fn test_probe_builds_result() {
        let client = Arc::new(MockProbeClient::new("seed"));
        healthy_node(&client, "a", true);
        healthy_node(&client, "b", true);
        let prober = ConcurrentProber::new(client.clone());

        let nodes = vec!["a".to_string(), "b".to_string()];
        let result = prober
            .probe(&nodes, Duration::from_secs(1), true, &ReplicaHealthEvaluator::default())
            .await;
        assert!(result.is_healthy());
        assert!(result.soft_check);
        assert_eq!(result.topology.clusters["main"].len(), 2);
        assert_eq!(client.host(), "seed");
    }
}
