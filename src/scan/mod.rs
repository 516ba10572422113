//! Cluster scanning
//!
//! This module provides:
//! - Typed rows for `system.replicas`, `system.clusters` and `system.parts`
//! - Concurrent two-query probing of every node with a per-scan timeout
//! - Aggregation of per-node rows into cluster and table placement
//! - The immutable [`ScanResult`] published to the registry

mod prober;
mod result;
mod rows;
mod topology;

pub use prober::{
    replicas_query, ConcurrentProber, CLUSTERS_QUERY, SOFT_REPLICAS_QUERY, STRICT_REPLICAS_QUERY,
};
pub use result::{NodeProbe, ScanResult};
pub use rows::{ClusterRow, HostPlacement, ReplicaRow, TableKey, TableSizeRow, UnqualifiedTable};
pub use topology::{ClusterTopology, Topology, TopologyAggregator};
