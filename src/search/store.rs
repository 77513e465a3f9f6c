use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::Result;
use crate::models::Record;
use crate::search::write_atomic;

/// Ordered record list, positionally aligned with a vector index:
/// `records[i]` describes the vector at position `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Load the persisted list, or an empty store if the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        let records: Vec<Record> = serde_json::from_str(&data)?;
        Ok(Self { records })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.records)?;
        write_atomic(path, data.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(|r| r.text.clone()).collect()
    }

    /// Build the post-upsert record list: every record whose id is not being
    /// replaced, in its current order, followed by `incoming` in input order.
    ///
    /// Returns the merged store and how many existing records were dropped.
    pub fn merge(&self, incoming: &[Record]) -> (RecordStore, usize) {
        let replaced: HashSet<&str> = incoming.iter().map(|r| r.id.as_str()).collect();

        let mut merged: Vec<Record> = self
            .records
            .iter()
            .filter(|r| !replaced.contains(r.id.as_str()))
            .cloned()
            .collect();
        let removed = self.records.len() - merged.len();

        merged.extend(incoming.iter().cloned());
        (RecordStore { records: merged }, removed)
    }

    /// Record counts per category.
    pub fn count_by_category(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.records {
            *counts.entry(r.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Record counts per value of `key`; records without it land under `unknown`.
    pub fn count_by_attribute(&self, key: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.records {
            let group = r.attribute_str(key).unwrap_or_else(|| "unknown".to_string());
            *counts.entry(group).or_insert(0) += 1;
        }
        counts
    }
}
