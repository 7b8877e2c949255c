//! Historical State Store
//!
//! Append-only snapshots of every name and namespace, one per block in which
//! the entry changed. Snapshots are copies of the live records, so later
//! mutations never rewrite history.

use crate::core::name::NameRecord;
use crate::core::namespace::Namespace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Snapshot of {key} at block {height} does not follow block {last}")]
    OutOfOrder { key: String, height: u64, last: u64 },
}

/// A record as it stood after a block was processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalEntry<T> {
    pub block_height: u64,
    pub record: T,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalStore {
    names: BTreeMap<String, Vec<HistoricalEntry<NameRecord>>>,
    namespaces: BTreeMap<String, Vec<HistoricalEntry<Namespace>>>,
}

impl HistoricalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_name(&mut self, block_height: u64, record: NameRecord) -> Result<(), HistoryError> {
        let key = record.name.clone();
        let entries = self.names.entry(key.clone()).or_default();
        push_entry(entries, &key, block_height, record)
    }

    pub fn append_namespace(
        &mut self,
        block_height: u64,
        namespace: Namespace,
    ) -> Result<(), HistoryError> {
        let key = namespace.namespace_id.clone();
        let entries = self.namespaces.entry(key.clone()).or_default();
        push_entry(entries, &key, block_height, namespace)
    }

    /// Latest snapshot of `name` at or before `block_height`
    pub fn name_at(&self, name: &str, block_height: u64) -> Option<&NameRecord> {
        self.names
            .get(name)
            .and_then(|entries| entry_at(entries, block_height))
    }

    /// Latest snapshot of a namespace at or before `block_height`
    pub fn namespace_at(&self, namespace_id: &str, block_height: u64) -> Option<&Namespace> {
        self.namespaces
            .get(namespace_id)
            .and_then(|entries| entry_at(entries, block_height))
    }

    /// Every snapshot of `name`, oldest first
    pub fn name_history(&self, name: &str) -> &[HistoricalEntry<NameRecord>] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn namespace_history(&self, namespace_id: &str) -> &[HistoricalEntry<Namespace>] {
        self.namespaces
            .get(namespace_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of snapshots held
    pub fn len(&self) -> usize {
        self.names.values().map(Vec::len).sum::<usize>()
            + self.namespaces.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_entry<T>(
    entries: &mut Vec<HistoricalEntry<T>>,
    key: &str,
    block_height: u64,
    record: T,
) -> Result<(), HistoryError> {
    if let Some(last) = entries.last() {
        if last.block_height >= block_height {
            return Err(HistoryError::OutOfOrder {
                key: key.to_string(),
                height: block_height,
                last: last.block_height,
            });
        }
    }

    entries.push(HistoricalEntry {
        block_height,
        record,
    });
    Ok(())
}

fn entry_at<T>(entries: &[HistoricalEntry<T>], block_height: u64) -> Option<&T> {
    let idx = entries.partition_point(|e| e.block_height <= block_height);
    if idx == 0 {
        None
    } else {
        Some(&entries[idx - 1].record)
    }
}
