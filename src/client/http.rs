//! ClickHouse HTTP interface client

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use crate::config::ClientConfig;

use super::{ProbeClient, ProbeError, RequestOptions, Row};

/// `FORMAT JSON` response envelope
#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TransportKey {
    connect_timeout: Duration,
    pinned: bool,
}

struct ClientState {
    host: String,
    timeout: Duration,
}

/// [`ProbeClient`] over the ClickHouse HTTP interface
pub struct HttpProbeClient {
    state: RwLock<ClientState>,
    port: u16,
    user: String,
    password: String,
    database: String,
    connect_timeout: Duration,
    /// reqwest only supports connect timeouts per client, so keep one per setting
    transports: DashMap<TransportKey, reqwest::Client>,
}

impl HttpProbeClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            state: RwLock::new(ClientState {
                host: config.host.clone(),
                timeout: Duration::from_millis(config.timeout_ms),
            }),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            transports: DashMap::new(),
        }
    }

    fn transport(&self, key: TransportKey, host: &str) -> Result<reqwest::Client, ProbeError> {
        if let Some(client) = self.transports.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder().connect_timeout(key.connect_timeout);
        if key.pinned {
            builder = builder.pool_max_idle_per_host(0);
        }
        let client = builder.build().map_err(|e| ProbeError::Transport {
            host: host.to_string(),
            message: e.to_string(),
        })?;

        debug!(connect_timeout = ?key.connect_timeout, pinned = key.pinned, "Created HTTP transport");
        self.transports.insert(key, client.clone());
        Ok(client)
    }

    fn url(&self, host: &str) -> String {
        if host.contains(':') && !host.starts_with('[') {
            // bare IPv6 literal
            format!("http://[{}]:{}/", host, self.port)
        } else {
            format!("http://{}:{}/", host, self.port)
        }
    }

    async fn send(&self, sql: &str, options: &RequestOptions) -> Result<(String, String), ProbeError> {
        let (default_host, default_timeout) = {
            let state = self.state.read();
            (state.host.clone(), state.timeout)
        };
        let host = options.host.clone().unwrap_or(default_host);
        let timeout = options.timeout.unwrap_or(default_timeout);
        let key = TransportKey {
            connect_timeout: options.connect_timeout.unwrap_or(self.connect_timeout),
            pinned: options.pin_address,
        };

        let response = self
            .transport(key, &host)?
            .post(self.url(&host))
            .query(&[("database", self.database.as_str()), ("default_format", "JSON")])
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .timeout(timeout)
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| classify(&host, timeout, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify(&host, timeout, e))?;

        if !status.is_success() {
            return Err(ProbeError::Query {
                host,
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }
        Ok((host, body))
    }
}

fn classify(host: &str, timeout: Duration, err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout {
            host: host.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        ProbeError::Transport {
            host: host.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl ProbeClient for HttpProbeClient {
    fn host(&self) -> String {
        self.state.read().host.clone()
    }

    fn set_host(&self, host: &str) {
        self.state.write().host = host.to_string();
    }

    fn timeout(&self) -> Duration {
        self.state.read().timeout
    }

    fn set_timeout(&self, timeout: Duration) {
        self.state.write().timeout = timeout;
    }

    async fn select(&self, sql: &str, options: &RequestOptions) -> Result<Vec<Row>, ProbeError> {
        let (host, body) = self.send(sql, options).await?;
        let envelope: JsonEnvelope =
            serde_json::from_str(&body).map_err(|e| ProbeError::Decode {
                host,
                message: e.to_string(),
            })?;
        Ok(envelope.data)
    }

    async fn execute(&self, sql: &str, options: &RequestOptions) -> Result<(), ProbeError> {
        self.send(sql, options).await.map(|_| ())
    }
}
