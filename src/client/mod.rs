//! Node probe client
//!
//! The scanner talks to nodes only through the [`ProbeClient`] trait:
//! - A default host and default request timeout (mutable, shared)
//! - Per-call overrides via [`RequestOptions`]
//! - Async `select`/`execute` so callers can fire many queries and join them
//!
//! [`HttpProbeClient`] is the ClickHouse HTTP implementation.

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpProbeClient;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;

/// One result row: column name -> value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Error from a single probe request
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("transport error on {host}: {message}")]
    Transport { host: String, message: String },
    #[error("query failed on {host} (HTTP {status}): {message}")]
    Query {
        host: String,
        status: u16,
        message: String,
    },
    #[error("request to {host} timed out after {timeout_ms}ms")]
    Timeout { host: String, timeout_ms: u64 },
    #[error("unexpected row from {host}: {message}")]
    Decode { host: String, message: String },
}

impl ProbeError {
    /// Transport-level failures (node unreachable) as opposed to query errors
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Query { .. } => "query",
            Self::Timeout { .. } => "timeout",
            Self::Decode { .. } => "decode",
        }
    }
}

/// Per-request overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Target host instead of the client's default host
    pub host: Option<String>,
    /// Request timeout instead of the client's default timeout
    pub timeout: Option<Duration>,
    /// Connect timeout instead of the client's configured one
    pub connect_timeout: Option<Duration>,
    /// Dial the given address directly, never reusing cached resolution
    pub pin_address: bool,
}

impl RequestOptions {
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Query executor for cluster nodes
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// Current default host
    fn host(&self) -> String;

    fn set_host(&self, host: &str);

    /// Current default request timeout
    fn timeout(&self) -> Duration;

    fn set_timeout(&self, timeout: Duration);

    /// Run a query and return its rows in server order
    async fn select(&self, sql: &str, options: &RequestOptions) -> Result<Vec<Row>, ProbeError>;

    /// Run a statement that returns no rows
    async fn execute(&self, sql: &str, options: &RequestOptions) -> Result<(), ProbeError>;
}

/// Decode raw rows into a typed row struct
pub fn decode_rows<T: DeserializeOwned>(host: &str, rows: Vec<Row>) -> Result<Vec<T>, ProbeError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| ProbeError::Decode {
                host: host.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Restores the client's default host when dropped
pub struct HostGuard<'a> {
    client: &'a dyn ProbeClient,
    original: String,
}

impl<'a> HostGuard<'a> {
    pub fn capture(client: &'a dyn ProbeClient) -> Self {
        let original = client.host();
        Self { client, original }
    }
}

impl Drop for HostGuard<'_> {
    fn drop(&mut self) {
        self.client.set_host(&self.original);
    }
}

/// Handle bound to one node, with its own request timeout
///
/// Cloning shares the timeout, so a per-node handle cached by the registry
/// keeps its timeout between calls.
#[derive(Clone)]
pub struct NodeClient {
    node: String,
    client: Arc<dyn ProbeClient>,
    timeout: Arc<RwLock<Duration>>,
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("node", &self.node)
            .field("timeout", &*self.timeout.read())
            .finish()
    }
}

impl NodeClient {
    pub fn new(node: impl Into<String>, client: Arc<dyn ProbeClient>) -> Self {
        let timeout = client.timeout();
        Self {
            node: node.into(),
            client,
            timeout: Arc::new(RwLock::new(timeout)),
        }
    }

    /// Address this handle is bound to
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.read()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }

    fn options(&self) -> RequestOptions {
        RequestOptions::for_host(self.node.clone()).with_timeout(self.timeout())
    }

    pub async fn select(&self, sql: &str) -> Result<Vec<Row>, ProbeError> {
        self.client.select(sql, &self.options()).await
    }

    pub async fn select_as<T: DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>, ProbeError> {
        let rows = self.select(sql).await?;
        decode_rows(&self.node, rows)
    }

    pub async fn execute(&self, sql: &str) -> Result<(), ProbeError> {
        self.client.execute(sql, &self.options()).await
    }

    /// Run a statement with a one-off timeout; the handle's own timeout is untouched
    pub async fn execute_with_timeout(&self, sql: &str, timeout: Duration) -> Result<(), ProbeError> {
        let options = RequestOptions::for_host(self.node.clone()).with_timeout(timeout);
        self.client.execute(sql, &options).await
    }
}
