//! Outcome of one cluster scan

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::ProbeError;
use crate::health::{HealthVerdict, ReplicaHealthEvaluator, Violation};

use super::rows::{ClusterRow, ReplicaRow};
use super::topology::{Topology, TopologyAggregator};

/// Raw probe results for one node
#[derive(Debug)]
pub struct NodeProbe {
    pub node: String,
    pub replicas: Result<Vec<ReplicaRow>, ProbeError>,
    pub clusters: Result<Vec<ClusterRow>, ProbeError>,
}

/// Everything learned from one scan
///
/// Built in one pass after all probes finished; never modified afterwards.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Nodes that were probed, in probe order
    pub nodes: Vec<String>,
    pub soft_check: bool,
    /// node -> replica rows, only for nodes whose replica probe succeeded
    pub replicas: BTreeMap<String, Vec<ReplicaRow>>,
    /// node -> cluster rows, only for nodes whose cluster probe succeeded
    pub clusters: BTreeMap<String, Vec<ClusterRow>>,
    pub topology: Topology,
    pub verdicts: BTreeMap<String, HealthVerdict>,
    /// node -> last probe error message
    pub bad_nodes: BTreeMap<String, String>,
    /// Human-readable diagnostics, accumulated across all nodes
    pub errors: Vec<String>,
    pub healthy: bool,
    pub elapsed: Duration,
}

impl ScanResult {
    /// Fold probe results in the order given
    pub fn build(
        probes: Vec<NodeProbe>,
        evaluator: &ReplicaHealthEvaluator,
        soft_check: bool,
        elapsed: Duration,
    ) -> Self {
        let mut aggregator = TopologyAggregator::new();
        let mut nodes = Vec::with_capacity(probes.len());
        let mut replicas = BTreeMap::new();
        let mut clusters = BTreeMap::new();
        let mut verdicts = BTreeMap::new();
        let mut bad_nodes = BTreeMap::new();
        let mut errors = Vec::new();

        for probe in probes {
            let node = probe.node;

            let verdict = match probe.replicas {
                Ok(rows) => {
                    aggregator.add_replica_rows(&node, &rows);
                    let verdict = evaluator.evaluate(&rows, soft_check);
                    replicas.insert(node.clone(), rows);
                    verdict
                }
                Err(e) => {
                    warn!(node = %node, error = %e, "Replica probe failed");
                    errors.push(format!("replicas: {e}"));
                    bad_nodes.insert(node.clone(), e.to_string());
                    HealthVerdict::probe_failed()
                }
            };

            match probe.clusters {
                Ok(rows) => {
                    aggregator.add_cluster_rows(&rows);
                    clusters.insert(node.clone(), rows);
                }
                Err(e) => {
                    warn!(node = %node, error = %e, "Cluster probe failed");
                    errors.push(format!("clusters: {e}"));
                    bad_nodes.insert(node.clone(), e.to_string());
                }
            }

            if !verdict.passed {
                // probe failures were already reported above
                errors.extend(
                    verdict
                        .findings
                        .iter()
                        .filter(|f| f.violation != Violation::ProbeFailed)
                        .map(|f| match f.row {
                            Some(_) => f.diagnostic(),
                            None => format!("{} : {}", f.violation, node),
                        }),
                );
            }
            verdicts.insert(node.clone(), verdict);
            nodes.push(node);
        }

        let replicas_ok = verdicts.values().all(|v| v.passed);
        if !replicas_ok {
            let states: BTreeMap<&str, bool> =
                verdicts.iter().map(|(n, v)| (n.as_str(), v.passed)).collect();
            errors.push(format!("Bad replicas state in {}", to_json(&states)));
        }
        if !bad_nodes.is_empty() {
            errors.push(format!("Have bad node : {}", to_json(&bad_nodes)));
        }
        let healthy = replicas_ok && bad_nodes.is_empty();

        info!(
            nodes = nodes.len(),
            bad_nodes = bad_nodes.len(),
            clusters = distinct_clusters(&clusters),
            healthy,
            elapsed_ms = elapsed.as_millis() as u64,
            "Cluster scan finished"
        );

        Self {
            nodes,
            soft_check,
            replicas,
            clusters,
            topology: aggregator.finish(),
            verdicts,
            bad_nodes,
            errors,
            healthy,
            elapsed,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn verdict(&self, node: &str) -> Option<&HealthVerdict> {
        self.verdicts.get(node)
    }

    /// All diagnostics as one JSON array string
    pub fn error_summary(&self) -> String {
        to_json(&self.errors)
    }
}

fn distinct_clusters(clusters: &BTreeMap<String, Vec<ClusterRow>>) -> usize {
    let mut names: Vec<&str> = clusters
        .values()
        .flat_map(|rows| rows.iter().map(|r| r.cluster.as_str()))
        .collect();
    names.sort_unstable();
    names.dedup();
    names.len()
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}
