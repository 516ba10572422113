//! Scripted in-memory client for tests

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::{ProbeClient, ProbeError, RequestOptions, Row};

#[derive(Debug, Clone)]
enum Outcome {
    Rows(Vec<Row>),
    QueryError(String),
    Unreachable,
}

/// Recorded request
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub host: String,
    pub sql: String,
    pub timeout: Duration,
    pub pinned: bool,
}

pub(crate) struct MockProbeClient {
    state: RwLock<(String, Duration)>,
    outcomes: DashMap<(String, String), Outcome>,
    delays: DashMap<String, Duration>,
    calls: Mutex<Vec<Call>>,
    rebind: bool,
}

impl MockProbeClient {
    pub fn new(host: &str) -> Self {
        Self {
            state: RwLock::new((host.to_string(), Duration::from_secs(20))),
            outcomes: DashMap::new(),
            delays: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            rebind: false,
        }
    }

    /// Client that switches its default host to every host it queries
    pub fn rebinding(host: &str) -> Self {
        Self {
            rebind: true,
            ..Self::new(host)
        }
    }

    pub fn respond(&self, host: &str, sql: &str, rows: Vec<Row>) {
        self.outcomes
            .insert((host.to_string(), sql.to_string()), Outcome::Rows(rows));
    }

    pub fn fail_query(&self, host: &str, sql: &str, message: &str) {
        self.outcomes.insert(
            (host.to_string(), sql.to_string()),
            Outcome::QueryError(message.to_string()),
        );
    }

    pub fn unreachable(&self, host: &str, sql: &str) {
        self.outcomes
            .insert((host.to_string(), sql.to_string()), Outcome::Unreachable);
    }

    /// Delay every request to `host`
    pub fn delay(&self, host: &str, delay: Duration) {
        self.delays.insert(host.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    async fn run(&self, sql: &str, options: &RequestOptions) -> Result<Vec<Row>, ProbeError> {
        let (default_host, default_timeout) = self.state.read().clone();
        let host = options.host.clone().unwrap_or(default_host);
        let timeout = options.timeout.unwrap_or(default_timeout);
        if self.rebind {
            self.state.write().0 = host.clone();
        }
        self.calls.lock().push(Call {
            host: host.clone(),
            sql: sql.to_string(),
            timeout,
            pinned: options.pin_address,
        });

        let delay = self.delays.get(&host).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcomes
            .get(&(host.clone(), sql.to_string()))
            .map(|o| o.clone());
        match outcome {
            Some(Outcome::Rows(rows)) => Ok(rows),
            Some(Outcome::QueryError(message)) => Err(ProbeError::Query {
                host,
                status: 500,
                message,
            }),
            Some(Outcome::Unreachable) => Err(ProbeError::Transport {
                host,
                message: "connection refused".into(),
            }),
            None => Err(ProbeError::Query {
                host,
                status: 404,
                message: format!("no scripted response for {sql}"),
            }),
        }
    }
}

#[async_trait]
impl ProbeClient for MockProbeClient {
    fn host(&self) -> String {
        self.state.read().0.clone()
    }

    fn set_host(&self, host: &str) {
        self.state.write().0 = host.to_string();
    }

    fn timeout(&self) -> Duration {
        self.state.read().1
    }

    fn set_timeout(&self, timeout: Duration) {
        self.state.write().1 = timeout;
    }

    async fn select(&self, sql: &str, options: &RequestOptions) -> Result<Vec<Row>, ProbeError> {
        self.run(sql, options).await
    }

    async fn execute(&self, sql: &str, options: &RequestOptions) -> Result<(), ProbeError> {
        match self.run(sql, options).await {
            Ok(_) => Ok(()),
            Err(ProbeError::Query { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Build a row from a JSON object literal
pub(crate) fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("row must be a JSON object, got {other}"),
    }
}
