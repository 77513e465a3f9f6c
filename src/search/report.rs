use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::search::sync::Snapshot;
use crate::search::vector::IndexKind;

/// Read-only health summary of the index/record pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub vectors: usize,
    pub records: usize,
    pub consistent: bool,
    /// 100 when counts agree, otherwise `min / max * 100`
    pub consistency_pct: f64,
    pub faulted: bool,
    pub index_type: IndexKind,
    pub dimension: usize,
    pub by_category: BTreeMap<String, usize>,
    pub group_key: String,
    pub by_group: BTreeMap<String, usize>,
    pub checked_at: DateTime<Utc>,
}

impl ConsistencyReport {
    pub fn from_snapshot(snapshot: &Snapshot, group_key: &str, faulted: bool) -> Self {
        let vectors = snapshot.vector_count();
        let records = snapshot.record_count();

        Self {
            vectors,
            records,
            consistent: vectors == records,
            consistency_pct: consistency_pct(vectors, records),
            faulted,
            index_type: snapshot.index.kind(),
            dimension: snapshot.index.dimension(),
            by_category: snapshot.records.count_by_category(),
            group_key: group_key.to_string(),
            by_group: snapshot.records.count_by_attribute(group_key),
            checked_at: Utc::now(),
        }
    }
}

fn consistency_pct(vectors: usize, records: usize) -> f64 {
    if vectors == records {
        100.0
    } else {
        vectors.min(records) as f64 / vectors.max(records) as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use crate::search::store::RecordStore;

    #[test]
    fn test_consistency_pct() {
        assert_eq!(consistency_pct(0, 0), 100.0);
        assert_eq!(consistency_pct(5, 5), 100.0);
        assert_eq!(consistency_pct(3, 4), 75.0);
        assert_eq!(consistency_pct(4, 0), 0.0);
    }

    #[test]
    fn test_report_breakdowns_and_mismatch() {
        let mut index = IndexKind::Flat.empty(2);
        index.add(&[vec![1.0, 0.0]]).unwrap();
        let snapshot = Snapshot {
            index,
            records: RecordStore::from_records(vec![
                Record::new("a", "zone", "x").with_attribute("province", "Hue"),
                Record::new("b", "poi", "y"),
            ]),
        };

        let report = ConsistencyReport::from_snapshot(&snapshot, "province", true);
        assert_eq!(report.vectors, 1);
        assert_eq!(report.records, 2);
        assert!(!report.consistent);
        assert_eq!(report.consistency_pct, 50.0);
        assert_eq!(report.by_category["zone"], 1);
        assert_eq!(report.by_group["Hue"], 1);
        assert_eq!(report.by_group["unknown"], 1);
        assert_eq!(report.index_type, IndexKind::Flat);
    }
}
