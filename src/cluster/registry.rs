//! Scan cache and accessors
//!
//! The registry resolves the seed host once, scans on first access and keeps
//! the result until a caller asks for a rescan. A published [`ScanResult`] is
//! never modified; a rescan swaps in a new one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::client::{HttpProbeClient, NodeClient, ProbeClient, ProbeError};
use crate::config::{Config, ScanConfig};
use crate::health::ReplicaHealthEvaluator;
use crate::metrics::metrics;
use crate::resolver::{collapse, DnsResolver, NodeResolver, StaticResolver};
use crate::scan::{
    ClusterTopology, ConcurrentProber, ReplicaRow, ScanResult, TableKey, TableSizeRow,
};

use super::size_cache::TableSizeCache;
use super::ClusterError;

/// Per-node active part sizes
pub const TABLE_SIZES_QUERY: &str = "SELECT database, table, sum(bytes) AS sizebytes FROM system.parts WHERE active GROUP BY database, table";

#[derive(Debug, Clone, Copy)]
struct ScanSettings {
    timeout: Duration,
    soft_check: bool,
    truncate_timeout: Duration,
}

/// Owns the last scan of one cluster
pub struct ClusterRegistry {
    client: Arc<dyn ProbeClient>,
    resolver: Arc<dyn NodeResolver>,
    /// Seed hostname expanded into nodes
    seed: String,
    settings: RwLock<ScanSettings>,
    evaluator: ReplicaHealthEvaluator,
    /// Resolved or explicitly set nodes
    nodes: RwLock<Option<Vec<String>>>,
    /// Last published scan
    scan: tokio::sync::RwLock<Option<Arc<ScanResult>>>,
    /// Per-node handles, kept so a node's timeout persists between calls
    handles: DashMap<String, NodeClient>,
    sizes: TableSizeCache,
    prober: ConcurrentProber,
}

impl ClusterRegistry {
    pub fn new(
        client: Arc<dyn ProbeClient>,
        resolver: Arc<dyn NodeResolver>,
        seed: impl Into<String>,
        config: &ScanConfig,
    ) -> Self {
        Self {
            prober: ConcurrentProber::new(client.clone()),
            client,
            resolver,
            seed: seed.into(),
            settings: RwLock::new(ScanSettings {
                timeout: config.timeout(),
                soft_check: config.soft_check,
                truncate_timeout: config.truncate_timeout(),
            }),
            evaluator: ReplicaHealthEvaluator::new(config.thresholds.clone(), config.zero_replicas),
            nodes: RwLock::new(None),
            scan: tokio::sync::RwLock::new(None),
            handles: DashMap::new(),
            sizes: TableSizeCache::new(),
        }
    }

    /// Registry over HTTP, resolving `client.host` through DNS unless
    /// `scan.nodes` lists the nodes explicitly
    pub fn from_config(config: &Config) -> Self {
        let client: Arc<dyn ProbeClient> = Arc::new(HttpProbeClient::new(&config.client));
        let resolver: Arc<dyn NodeResolver> = if config.scan.nodes.is_empty() {
            Arc::new(DnsResolver)
        } else {
            Arc::new(StaticResolver::new(config.scan.nodes.iter().cloned()))
        };
        Self::new(client, resolver, config.client.host.clone(), &config.scan)
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Current scan, running the first one if none exists yet
    pub async fn connect(&self) -> Result<Arc<ScanResult>, ClusterError> {
        if let Some(scan) = self.scan.read().await.as_ref() {
            return Ok(scan.clone());
        }

        let mut slot = self.scan.write().await;
        // another caller may have scanned while we waited
        if let Some(scan) = slot.as_ref() {
            return Ok(scan.clone());
        }
        let scan = Arc::new(self.run_scan().await?);
        *slot = Some(scan.clone());
        Ok(scan)
    }

    /// Scan again and replace the cached result
    pub async fn rescan(&self) -> Result<Arc<ScanResult>, ClusterError> {
        let mut slot = self.scan.write().await;
        let scan = Arc::new(self.run_scan().await?);
        *slot = Some(scan.clone());
        Ok(scan)
    }

    /// Drop the cached scan; the next accessor scans again
    pub async fn invalidate(&self) {
        *self.scan.write().await = None;
    }

    /// Cached scan, if any, without triggering one
    pub async fn last_scan(&self) -> Option<Arc<ScanResult>> {
        self.scan.read().await.clone()
    }

    async fn run_scan(&self) -> Result<ScanResult, ClusterError> {
        let nodes = self.nodes().await?;
        let settings = *self.settings.read();
        info!(
            seed = %self.seed,
            nodes = nodes.len(),
            soft_check = settings.soft_check,
            "Scanning cluster"
        );
        Ok(self
            .prober
            .probe(&nodes, settings.timeout, settings.soft_check, &self.evaluator)
            .await)
    }

    // ------------------------------------------------------------------
    // Nodes and settings
    // ------------------------------------------------------------------

    /// Nodes to scan, resolving the seed host on first use
    pub async fn nodes(&self) -> Result<Vec<String>, ClusterError> {
        if let Some(nodes) = self.nodes.read().as_ref() {
            return Ok(nodes.clone());
        }

        let resolved = self.resolver.resolve(&self.seed).await?;
        let mut slot = self.nodes.write();
        Ok(slot.get_or_insert(resolved).clone())
    }

    /// Replace the node list; takes effect on the next scan
    pub fn set_nodes<I, S>(&self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nodes = collapse(nodes.into_iter().map(Into::into));
        debug!(nodes = ?nodes, "Node list set");
        *self.nodes.write() = Some(nodes);
    }

    pub fn soft_check(&self) -> bool {
        self.settings.read().soft_check
    }

    pub fn set_soft_check(&self, soft_check: bool) {
        self.settings.write().soft_check = soft_check;
    }

    pub fn scan_timeout(&self) -> Duration {
        self.settings.read().timeout
    }

    pub fn set_scan_timeout(&self, timeout: Duration) {
        self.settings.write().timeout = timeout;
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// True iff every node passed and none failed to answer
    pub async fn is_replicas_ok(&self) -> Result<bool, ClusterError> {
        Ok(self.connect().await?.is_healthy())
    }

    /// Diagnostics of the current scan as one JSON array
    pub async fn error_summary(&self) -> Result<String, ClusterError> {
        Ok(self.connect().await?.error_summary())
    }

    /// node -> error message for nodes whose probe failed
    pub async fn bad_nodes(&self) -> Result<BTreeMap<String, String>, ClusterError> {
        Ok(self.connect().await?.bad_nodes.clone())
    }

    // ------------------------------------------------------------------
    // Clusters
    // ------------------------------------------------------------------

    pub async fn cluster_list(&self) -> Result<Vec<String>, ClusterError> {
        let scan = self.connect().await?;
        Ok(scan.topology.clusters.keys().cloned().collect())
    }

    /// Placement of every host in `cluster`
    pub async fn cluster_info(&self, cluster: &str) -> Result<ClusterTopology, ClusterError> {
        let scan = self.connect().await?;
        scan.topology
            .clusters
            .get(cluster)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("cluster", cluster))
    }

    /// Hosts of a cluster in the order they were first reported
    pub async fn cluster_nodes(&self, cluster: &str) -> Result<Vec<String>, ClusterError> {
        let scan = self.connect().await?;
        let hosts = scan
            .topology
            .clusters
            .get(cluster)
            .ok_or_else(|| ClusterError::not_found("cluster", cluster))?;
        Ok(hosts.hosts().map(str::to_string).collect())
    }

    pub async fn cluster_count_shard(&self, cluster: &str) -> Result<usize, ClusterError> {
        let scan = self.connect().await?;
        scan.topology
            .clusters
            .get(cluster)
            .map(|c| c.shard_count())
            .ok_or_else(|| ClusterError::not_found("cluster", cluster))
    }

    pub async fn cluster_count_replica(&self, cluster: &str) -> Result<usize, ClusterError> {
        let scan = self.connect().await?;
        scan.topology
            .clusters
            .get(cluster)
            .map(|c| c.replica_count())
            .ok_or_else(|| ClusterError::not_found("cluster", cluster))
    }

    /// host address -> port -> host name
    pub async fn hostnames(&self) -> Result<BTreeMap<String, BTreeMap<u16, String>>, ClusterError> {
        Ok(self.connect().await?.topology.hostnames.clone())
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// `database.table` -> nodes reporting it
    pub async fn tables(&self) -> Result<BTreeMap<String, Vec<String>>, ClusterError> {
        let scan = self.connect().await?;
        Ok(scan
            .topology
            .tables
            .iter()
            .map(|(key, nodes)| (key.to_string(), nodes.keys().cloned().collect()))
            .collect())
    }

    /// `database.table` -> node -> replica row
    pub async fn tables_detail(
        &self,
    ) -> Result<BTreeMap<String, BTreeMap<String, ReplicaRow>>, ClusterError> {
        let scan = self.connect().await?;
        Ok(scan
            .topology
            .tables
            .iter()
            .map(|(key, nodes)| (key.to_string(), nodes.clone()))
            .collect())
    }

    /// Nodes reporting `database.table`
    pub async fn nodes_by_table(&self, table: &str) -> Result<Vec<String>, ClusterError> {
        let key: TableKey = table.parse()?;
        let scan = self.connect().await?;
        let nodes = scan
            .topology
            .tables
            .get(&key)
            .ok_or_else(|| ClusterError::not_found("table", table))?;
        Ok(nodes.keys().cloned().collect())
    }

    /// Nodes holding leadership for `database.table`; empty for unknown tables
    pub async fn master_nodes_for_table(&self, table: &str) -> Result<Vec<String>, ClusterError> {
        let key: TableKey = table.parse()?;
        let scan = self.connect().await?;
        Ok(scan
            .topology
            .tables
            .get(&key)
            .into_iter()
            .flat_map(|nodes| nodes.iter())
            .filter(|(_, row)| row.is_leader)
            .map(|(node, _)| node.clone())
            .collect())
    }

    /// Bytes of active parts of `database.table`, summed over the cluster
    ///
    /// Each owning node's size list is fetched once and cached until
    /// [`clear_table_sizes`](Self::clear_table_sizes). `None` when no cached
    /// node reports the table.
    pub async fn size_table(&self, table: &str) -> Result<Option<u64>, ClusterError> {
        let key: TableKey = table.parse()?;
        let scan = self.connect().await?;

        let missing: Vec<String> = scan
            .topology
            .tables
            .get(&key)
            .map(|nodes| {
                nodes
                    .keys()
                    .filter(|node| !self.sizes.contains(node))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let fetched = join_all(missing.into_iter().map(|node| async move {
            let rows = self.client(&node).select_as::<TableSizeRow>(TABLE_SIZES_QUERY).await;
            metrics().record_table_size_fetch(rows.is_ok());
            (node, rows)
        }))
        .await;

        // cache every answer before reporting the first failure
        let mut failure = None;
        for (node, rows) in fetched {
            match rows {
                Ok(rows) => {
                    debug!(node = %node, tables = rows.len(), "Cached table sizes");
                    self.sizes.insert(&node, rows);
                }
                Err(source) => {
                    warn!(node = %node, error = %source, "Table size query failed");
                    failure.get_or_insert(ClusterError::Probe { node, source });
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(self.sizes.total_bytes(&key)),
        }
    }

    /// Forget every cached table size
    pub fn clear_table_sizes(&self) {
        self.sizes.clear();
    }

    /// Forget one node's cached table sizes
    pub fn invalidate_table_sizes(&self, node: &str) -> bool {
        self.sizes.invalidate(node)
    }

    /// Truncate `database.table` on every leader node
    ///
    /// A table no node leads yields an empty map. The timeout applies to the
    /// statement only; the leaders' handles keep their own timeouts.
    pub async fn truncate_table(
        &self,
        table: &str,
        timeout: Option<Duration>,
    ) -> Result<BTreeMap<String, Result<(), ProbeError>>, ClusterError> {
        let leaders = self.master_nodes_for_table(table).await?;
        let key: TableKey = table.parse()?;
        let timeout = timeout.unwrap_or_else(|| self.settings.read().truncate_timeout);
        let sql = format!("TRUNCATE TABLE {key}");

        info!(table = %key, leaders = ?leaders, timeout_ms = timeout.as_millis() as u64, "Truncating table");
        let outcomes = join_all(leaders.into_iter().map(|node| {
            let handle = self.client(&node);
            let sql = sql.as_str();
            async move {
                let result = handle.execute_with_timeout(sql, timeout).await;
                if let Err(e) = &result {
                    warn!(node = %node, error = %e, "Truncate failed");
                }
                (node, result)
            }
        }))
        .await;

        Ok(outcomes.into_iter().collect())
    }

    // ------------------------------------------------------------------
    // Node handles
    // ------------------------------------------------------------------

    /// Handle bound to `node`, shared between calls
    pub fn client(&self, node: &str) -> NodeClient {
        self.handles
            .entry(node.to_string())
            .or_insert_with(|| NodeClient::new(node, self.client.clone()))
            .clone()
    }

    /// Handle bound to the first node
    pub async fn active_client(&self) -> Result<NodeClient, ClusterError> {
        let nodes = self.nodes().await?;
        let node = nodes
            .first()
            .ok_or_else(|| ClusterError::not_found("node", self.seed.clone()))?;
        Ok(self.client(node))
    }

    /// Handle for the first host of `cluster` matching one of the
    /// `;`-separated address fragments, tried in order
    ///
    /// Empty fragments are ignored. Only hosts in the current node list
    /// qualify. Without a match the cluster's first listed host is used,
    /// reachable or not.
    pub async fn client_like(&self, cluster: &str, patterns: &str) -> Result<NodeClient, ClusterError> {
        let scan = self.connect().await?;
        let hosts = scan
            .topology
            .clusters
            .get(cluster)
            .ok_or_else(|| ClusterError::not_found("cluster", cluster))?;
        let nodes = self.nodes().await?;

        let matched = patterns
            .split(';')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .find_map(|pattern| {
                hosts.hosts().find(|host| {
                    host.to_lowercase().contains(&pattern) && nodes.iter().any(|n| n == host)
                })
            });

        let host = match matched {
            Some(host) => host,
            None => {
                let first = hosts
                    .first_host()
                    .ok_or_else(|| ClusterError::not_found("cluster", cluster))?;
                debug!(cluster = %cluster, patterns = %patterns, fallback = %first, "No node matched, using first host");
                first
            }
        };
        Ok(self.client(host))
    }
}
