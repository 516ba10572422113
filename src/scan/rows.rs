//! Typed rows for the system tables the scanner reads
//!
//! ClickHouse's JSON output quotes 64-bit integers and renders booleans as
//! `UInt8`, so numeric and flag columns accept either representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One row of `system.replicas`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaRow {
    pub database: String,
    pub table: String,
    #[serde(default)]
    pub engine: String,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_leader: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_readonly: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_session_expired: bool,
    #[serde(deserialize_with = "lenient::uint")]
    pub future_parts: u64,
    #[serde(deserialize_with = "lenient::uint")]
    pub parts_to_check: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookeeper_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_path: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub columns_version: Option<i64>,
    #[serde(deserialize_with = "lenient::uint")]
    pub queue_size: u64,
    #[serde(default, deserialize_with = "lenient::uint")]
    pub inserts_in_queue: u64,
    #[serde(default, deserialize_with = "lenient::uint")]
    pub merges_in_queue: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_oldest_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserts_oldest_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merges_oldest_time: Option<String>,

    // Only present with `SELECT *`: reading them costs coordination-service
    // round trips per row.
    #[serde(
        default,
        deserialize_with = "lenient::opt_uint",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_max_index: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_uint",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_pointer: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_uint",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_replicas: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_uint",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_replicas: Option<u64>,
}

impl ReplicaRow {
    pub fn key(&self) -> TableKey {
        TableKey::new(&self.database, &self.table)
    }

    /// Replication log entries not yet fetched by this replica
    pub fn log_lag(&self) -> Option<u64> {
        match (self.log_max_index, self.log_pointer) {
            (Some(max), Some(pointer)) => Some(max.saturating_sub(pointer)),
            _ => None,
        }
    }
}

/// One row of `system.clusters`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRow {
    pub cluster: String,
    #[serde(deserialize_with = "lenient::uint")]
    pub shard_num: u64,
    #[serde(deserialize_with = "lenient::uint")]
    pub shard_weight: u64,
    #[serde(deserialize_with = "lenient::uint")]
    pub replica_num: u64,
    pub host_name: String,
    pub host_address: String,
    #[serde(deserialize_with = "lenient::uint")]
    pub port: u16,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_database: Option<String>,
}

impl ClusterRow {
    pub fn placement(&self) -> HostPlacement {
        HostPlacement {
            shard_num: self.shard_num,
            replica_num: self.replica_num,
            shard_weight: self.shard_weight,
            is_local: self.is_local,
        }
    }
}

/// Where one host sits inside a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostPlacement {
    pub shard_num: u64,
    pub replica_num: u64,
    pub shard_weight: u64,
    pub is_local: bool,
}

/// Per-node table size from `system.parts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSizeRow {
    pub database: String,
    pub table: String,
    #[serde(deserialize_with = "lenient::uint")]
    pub sizebytes: u64,
}

impl TableSizeRow {
    pub fn key(&self) -> TableKey {
        TableKey::new(&self.database, &self.table)
    }
}

/// `database.table`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKey {
    pub database: String,
    pub table: String,
}

impl TableKey {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Table name without a `database.` qualifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("table name {0:?} must be qualified as database.table")]
pub struct UnqualifiedTable(pub String);

impl FromStr for TableKey {
    type Err = UnqualifiedTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((db, table)) if !db.is_empty() && !table.is_empty() => Ok(Self::new(db, table)),
            _ => Err(UnqualifiedTable(s.to_string())),
        }
    }
}

mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn as_u64<E: serde::de::Error>(value: &Value) -> Result<u64, E> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| E::custom(format!("expected unsigned integer, got {n}"))),
            Value::String(s) => s
                .parse()
                .map_err(|_| E::custom(format!("expected unsigned integer, got {s:?}"))),
            Value::Bool(b) => Ok(u64::from(*b)),
            other => Err(E::custom(format!("expected unsigned integer, got {other}"))),
        }
    }

    pub fn uint<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        let n = as_u64::<D::Error>(&Value::deserialize(d)?)?;
        T::try_from(n).map_err(|_| D::Error::custom(format!("{n} out of range")))
    }

    pub fn opt_uint<'de, D>(d: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            v => as_u64(&v).map(Some),
        }
    }

    pub fn opt_int<'de, D>(d: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected integer, got {n}"))),
            Value::String(s) => s
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected integer, got {s:?}"))),
            other => Err(D::Error::custom(format!("expected integer, got {other}"))),
        }
    }

    pub fn flag<'de, D>(d: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(d)? {
            Value::Bool(b) => Ok(b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            v => as_u64(&v).map(|n| n != 0),
        }
    }
}
