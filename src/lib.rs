//! Topology and health scanner for sharded, replicated ClickHouse clusters
//!
//! A seed hostname is expanded into nodes, every node is probed for its
//! `system.replicas` and `system.clusters` state, and the merged view is
//! cached in a [`ClusterRegistry`].

pub mod client;
pub mod cluster;
pub mod config;
pub mod health;
pub mod metrics;
pub mod resolver;
pub mod scan;

pub use client::{HttpProbeClient, NodeClient, ProbeClient, ProbeError};
pub use cluster::{ClusterError, ClusterRegistry};
pub use config::Config;
pub use health::{HealthVerdict, ReplicaHealthEvaluator};
pub use resolver::{DnsResolver, NodeResolver, ResolveError, StaticResolver};
pub use scan::{ScanResult, TableKey};
