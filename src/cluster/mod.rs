//! Cached cluster view
//!
//! [`ClusterRegistry`] owns the last scan and answers topology, health and
//! table questions from it. The first accessor call triggers the scan.

mod registry;
mod size_cache;

pub use registry::{ClusterRegistry, TABLE_SIZES_QUERY};
pub use size_cache::TableSizeCache;

use crate::client::ProbeError;
use crate::resolver::ResolveError;
use crate::scan::UnqualifiedTable;

/// Errors surfaced by registry accessors
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Seed host yielded no nodes; nothing was scanned
    #[error("node resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error(transparent)]
    InvalidTableName(#[from] UnqualifiedTable),

    #[error("request to node {node} failed: {source}")]
    Probe {
        node: String,
        #[source]
        source: ProbeError,
    },
}

impl ClusterError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
