use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::llm::embeddings::{embed_single, EmbeddingProvider};
use crate::models::{Filters, ScoredRecord};
use crate::search::sync::{Snapshot, SyncEngine};
use crate::search::vector::Neighbor;

/// Read-side tuning shared by plain and hybrid search.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub max_top_k: usize,
    pub overfetch_factor: usize,
    pub group_key: String,
}

impl RetrievalSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_top_k: config.max_top_k,
            overfetch_factor: config.overfetch_factor.max(1),
            group_key: config.group_key.clone(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Query side of the service. Every call works against one snapshot taken
/// at its start, so a concurrent upsert never changes the data mid-query.
pub struct Retriever {
    engine: Arc<SyncEngine>,
    settings: RetrievalSettings,
}

impl Retriever {
    pub fn new(engine: Arc<SyncEngine>, settings: RetrievalSettings) -> Self {
        Self { engine, settings }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub(crate) fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub(crate) fn embedder(&self) -> &dyn EmbeddingProvider {
        self.engine.embedder().as_ref()
    }

    pub(crate) fn check_top_k(&self, top_k: usize) -> Result<()> {
        if top_k == 0 || top_k > self.settings.max_top_k {
            return Err(ServiceError::Validation(format!(
                "top_k must be between 1 and {}, got {top_k}",
                self.settings.max_top_k
            )));
        }
        Ok(())
    }

    /// Plain top-k similarity search with post-hoc hard filters.
    ///
    /// Filtering happens after retrieval, so fewer than `top_k` hits may come
    /// back. Output keeps the index's descending-similarity order.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &Filters,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredRecord>> {
        if query.trim().is_empty() {
            return Err(ServiceError::Validation("query is required".to_string()));
        }
        self.check_top_k(top_k)?;

        let snapshot = self.engine.snapshot();
        if snapshot.index.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let query_vector = embed_single(self.embedder(), query).await?;
        let k = top_k.min(snapshot.index.len());
        let neighbors = snapshot.index.search(&query_vector, k)?;

        let hits = filter_neighbors(
            &snapshot,
            &neighbors,
            filters,
            min_score,
            &self.settings.group_key,
        );

        tracing::info!(
            "Search {:?}: {} hits in {:.2}ms",
            preview(query),
            hits.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(hits)
    }
}

/// Join neighbours to their records and apply the hard filters.
/// Positions outside the record store are skipped.
pub fn filter_neighbors(
    snapshot: &Snapshot,
    neighbors: &[Neighbor],
    filters: &Filters,
    min_score: Option<f32>,
    group_key: &str,
) -> Vec<ScoredRecord> {
    neighbors
        .iter()
        .filter_map(|n| {
            let record = snapshot.records.get(n.position)?;
            if !filters.matches(record, group_key) {
                return None;
            }
            if min_score.is_some_and(|min| n.score < min) {
                return None;
            }
            Some(ScoredRecord {
                id: record.id.clone(),
                score: n.score,
                category: record.category.clone(),
                text: record.text.clone(),
                attributes: record.attributes.clone(),
            })
        })
        .collect()
}

pub(crate) fn preview(query: &str) -> String {
    if query.chars().count() > 50 {
        let head: String = query.chars().take(50).collect();
        format!("{head}...")
    } else {
        query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use crate::search::store::RecordStore;
    use crate::search::vector::IndexKind;

    fn snapshot() -> Snapshot {
        let mut index = IndexKind::Flat.empty(2);
        index.add(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        Snapshot {
            index,
            records: RecordStore::from_records(vec![
                Record::new("a", "zone", "beach").with_attribute("province", "Hue"),
                Record::new("b", "poi", "market"),
            ]),
        }
    }

    #[test]
    fn test_min_score_is_inclusive() {
        let snap = snapshot();
        let neighbors = vec![
            Neighbor { score: 0.5, position: 0 },
            Neighbor { score: 0.4999, position: 1 },
        ];
        let hits = filter_neighbors(&snap, &neighbors, &Filters::default(), Some(0.5), "province");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn test_out_of_range_positions_are_skipped() {
        let snap = snapshot();
        let neighbors = vec![
            Neighbor { score: 0.9, position: 7 },
            Neighbor { score: 0.8, position: 1 },
        ];
        let hits = filter_neighbors(&snap, &neighbors, &Filters::default(), None, "province");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn test_filters_preserve_similarity_order() {
        let snap = snapshot();
        let neighbors = vec![
            Neighbor { score: 0.9, position: 1 },
            Neighbor { score: 0.8, position: 0 },
        ];
        let hits = filter_neighbors(&snap, &neighbors, &Filters::default(), None, "province");
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let only_hue = Filters::new(None, Some("Hue".into()));
        let hits = filter_neighbors(&snap, &neighbors, &only_hue, None, "province");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn test_preview_truncates_long_queries() {
        let long = "x".repeat(80);
        assert_eq!(preview(&long).len(), 53);
        assert_eq!(preview("short"), "short");
    }
}
