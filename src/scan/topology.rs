//! Merges per-node views into one cluster topology

use std::collections::{BTreeMap, BTreeSet};

use super::rows::{ClusterRow, HostPlacement, ReplicaRow, TableKey};

/// Hosts of one cluster, in the order they were first reported
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterTopology {
    hosts: Vec<(String, HostPlacement)>,
}

impl ClusterTopology {
    /// Insert or overwrite a host's placement, keeping its original position
    fn upsert(&mut self, host: &str, placement: HostPlacement) {
        match self.hosts.iter_mut().find(|(h, _)| h == host) {
            Some(entry) => entry.1 = placement,
            None => self.hosts.push((host.to_string(), placement)),
        }
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(|(h, _)| h.as_str())
    }

    pub fn first_host(&self) -> Option<&str> {
        self.hosts.first().map(|(h, _)| h.as_str())
    }

    pub fn placement(&self, host: &str) -> Option<&HostPlacement> {
        self.hosts.iter().find(|(h, _)| h == host).map(|(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostPlacement)> {
        self.hosts.iter().map(|(h, p)| (h.as_str(), p))
    }

    /// Number of distinct shard numbers
    pub fn shard_count(&self) -> usize {
        self.hosts
            .iter()
            .map(|(_, p)| p.shard_num)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Number of distinct replica numbers
    pub fn replica_count(&self) -> usize {
        self.hosts
            .iter()
            .map(|(_, p)| p.replica_num)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Merged view of every node that answered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    /// cluster name -> hosts
    pub clusters: BTreeMap<String, ClusterTopology>,
    /// database.table -> node -> replica row
    pub tables: BTreeMap<TableKey, BTreeMap<String, ReplicaRow>>,
    /// host address -> port -> host name
    pub hostnames: BTreeMap<String, BTreeMap<u16, String>>,
}

/// Folds per-node probe rows into a [`Topology`]
///
/// Every node is expected to report the same `system.clusters` content, so
/// conflicting rows are resolved by overwrite.
#[derive(Debug, Default)]
pub struct TopologyAggregator {
    topology: Topology,
}

impl TopologyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cluster_rows(&mut self, rows: &[ClusterRow]) {
        for row in rows {
            self.topology
                .clusters
                .entry(row.cluster.clone())
                .or_default()
                .upsert(&row.host_address, row.placement());
            self.topology
                .hostnames
                .entry(row.host_address.clone())
                .or_default()
                .insert(row.port, row.host_name.clone());
        }
    }

    pub fn add_replica_rows(&mut self, node: &str, rows: &[ReplicaRow]) {
        for row in rows {
            self.topology
                .tables
                .entry(row.key())
                .or_default()
                .insert(node.to_string(), row.clone());
        }
    }

    pub fn finish(self) -> Topology {
        self.topology
    }
}
