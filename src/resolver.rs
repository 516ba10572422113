//! Seed host expansion
//!
//! A cluster is addressed through one DNS name that resolves to every node.
//! Resolution happens once per registry; the resulting set is sorted so scans
//! are reproducible regardless of DNS answer order.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{0} resolved to no addresses")]
    NoAddresses(String),
    #[error("failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        source: std::io::Error,
    },
}

/// Expands a seed hostname into node addresses
#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve(&self, seed: &str) -> Result<Vec<String>, ResolveError>;
}

/// Resolver backed by the system DNS
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

#[async_trait]
impl NodeResolver for DnsResolver {
    async fn resolve(&self, seed: &str) -> Result<Vec<String>, ResolveError> {
        let addrs = tokio::net::lookup_host((seed, 0))
            .await
            .map_err(|source| ResolveError::Lookup {
                host: seed.to_string(),
                source,
            })?;
        let nodes = collapse(addrs.map(|a| a.ip().to_string()));
        if nodes.is_empty() {
            return Err(ResolveError::NoAddresses(seed.to_string()));
        }
        debug!(seed = %seed, nodes = ?nodes, "Resolved seed host");
        Ok(nodes)
    }
}

/// Fixed node list, ignoring the seed
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    nodes: Vec<String>,
}

impl StaticResolver {
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: collapse(nodes.into_iter().map(Into::into)),
        }
    }
}

#[async_trait]
impl NodeResolver for StaticResolver {
    async fn resolve(&self, seed: &str) -> Result<Vec<String>, ResolveError> {
        if self.nodes.is_empty() {
            return Err(ResolveError::NoAddresses(seed.to_string()));
        }
        Ok(self.nodes.clone())
    }
}

/// Sorted, duplicate-free node list
pub(crate) fn collapse(addrs: impl Iterator<Item = String>) -> Vec<String> {
    addrs.collect::<BTreeSet<_>>().into_iter().collect()
}
