//! Per-node table size cache
//!
//! Entries survive rescans. Sizes go stale until a caller clears them.

use dashmap::DashMap;

use crate::scan::{TableKey, TableSizeRow};

/// node -> sizes of every table on that node
#[derive(Debug, Default)]
pub struct TableSizeCache {
    entries: DashMap<String, Vec<TableSizeRow>>,
}

impl TableSizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &str) -> Option<Vec<TableSizeRow>> {
        self.entries.get(node).map(|rows| rows.clone())
    }

    pub fn insert(&self, node: &str, rows: Vec<TableSizeRow>) {
        self.entries.insert(node.to_string(), rows);
    }

    pub fn contains(&self, node: &str) -> bool {
        self.entries.contains_key(node)
    }

    /// Drop one node's entry; returns whether it was cached
    pub fn invalidate(&self, node: &str) -> bool {
        self.entries.remove(node).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the table's size over every cached node
    ///
    /// `None` when no cached node reports the table.
    pub fn total_bytes(&self, key: &TableKey) -> Option<u64> {
        let mut total: Option<u64> = None;
        for entry in self.entries.iter() {
            for row in entry.value().iter().filter(|r| r.database == key.database && r.table == key.table) {
                total = Some(total.unwrap_or(0).saturating_add(row.sizebytes));
            }
        }
        total
    }
}
