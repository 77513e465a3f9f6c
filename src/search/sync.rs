//! Write path: keeps the vector index and the record store aligned.
//!
//! Every write builds a complete candidate [`Snapshot`] off to the side and
//! installs it with a single pointer swap. Readers clone the current
//! `Arc<Snapshot>` and never observe a half-applied write.
//!
//! The index has no per-slot delete, so an upsert re-embeds the whole merged
//! record set in its final order. Cost grows with corpus size, not batch size.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::{Result, ServiceError};
use crate::llm::embeddings::EmbeddingProvider;
use crate::models::{Record, UpsertResult};
use crate::search::store::RecordStore;
use crate::search::vector::{IndexKind, VectorIndex};

/// An index and the records aligned with it, installed and read as a unit.
pub struct Snapshot {
    pub index: Box<dyn VectorIndex>,
    pub records: RecordStore,
}

impl Snapshot {
    pub fn empty(kind: IndexKind, dimension: usize) -> Self {
        Self {
            index: kind.empty(dimension),
            records: RecordStore::new(),
        }
    }

    pub fn vector_count(&self) -> usize {
        self.index.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.vector_count() == self.record_count()
    }

    fn fault(&self) -> ServiceError {
        ServiceError::ConsistencyFault {
            vectors: self.vector_count(),
            records: self.record_count(),
        }
    }
}

/// Where the paired artifacts live on disk.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub vectors: PathBuf,
    pub records: PathBuf,
}

impl SnapshotPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            vectors: config.vectors_path(),
            records: config.records_path(),
        }
    }
}

/// Owner of the shared index state and the only place it is mutated.
pub struct SyncEngine {
    kind: IndexKind,
    embedder: Arc<dyn EmbeddingProvider>,
    paths: SnapshotPaths,
    current: RwLock<Arc<Snapshot>>,
    /// Serialises writers; held across the rebuild, never by readers.
    writer: tokio::sync::Mutex<()>,
    faulted: AtomicBool,
}

impl SyncEngine {
    /// Open the engine, loading any persisted state.
    ///
    /// A count mismatch on disk does not fail startup: it is logged and the
    /// engine comes up faulted, refusing writes until reset or reloaded.
    pub fn open(
        kind: IndexKind,
        embedder: Arc<dyn EmbeddingProvider>,
        paths: SnapshotPaths,
    ) -> Result<Self> {
        let snapshot = load_snapshot(kind, embedder.dimension(), &paths)?;
        let consistent = snapshot.is_consistent();

        tracing::info!(
            "Index ready: {} vectors, {} records ({kind})",
            snapshot.vector_count(),
            snapshot.record_count()
        );

        Ok(Self {
            kind,
            embedder,
            paths,
            current: RwLock::new(Arc::new(snapshot)),
            writer: tokio::sync::Mutex::new(()),
            faulted: AtomicBool::new(!consistent),
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// The current consistent state. Cheap; holds no lock once returned.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    /// Insert or replace records by id.
    ///
    /// Records whose id appears in the batch are dropped, survivors keep their
    /// order, the batch is appended, and the full merged set is re-embedded
    /// into a fresh index. Nothing is visible to readers until the swap.
    pub async fn upsert(&self, batch: Vec<Record>) -> Result<UpsertResult> {
        validate_batch(&batch)?;
        let batch = dedupe_last_wins(batch);

        let _guard = self.writer.lock().await;
        if self.is_faulted() {
            return Err(self.snapshot().fault());
        }

        let started = Instant::now();
        let current = self.snapshot();
        tracing::info!("Upsert started: {} items", batch.len());

        let (merged, removed) = current.records.merge(&batch);
        tracing::info!(
            removed,
            added = batch.len(),
            before = current.record_count(),
            after = merged.len(),
            "Metadata updated"
        );

        let index = self.build_index(&merged).await?;
        let candidate = Snapshot {
            index,
            records: merged,
        };
        if !candidate.is_consistent() {
            return Err(ServiceError::Index(format!(
                "rebuilt index holds {} vectors for {} records",
                candidate.vector_count(),
                candidate.record_count()
            )));
        }

        *self.current.write() = Arc::new(candidate);

        let live = self.snapshot();
        self.persist(&live)?;

        let consistent = live.is_consistent();
        tracing::info!(
            vectors = live.vector_count(),
            records = live.record_count(),
            consistent,
            "Consistency check"
        );
        if !consistent {
            self.mark_faulted(&live);
            return Err(live.fault());
        }

        tracing::info!(
            "Upsert completed in {:.2}s: {} total",
            started.elapsed().as_secs_f64(),
            live.record_count()
        );

        Ok(UpsertResult {
            added: batch.len(),
            removed,
            total: live.record_count(),
        })
    }

    /// Replace everything with an empty index of the configured variant.
    /// Clears any fault. Persistence failures are logged, not returned.
    pub async fn reset(&self) {
        let _guard = self.writer.lock().await;

        *self.current.write() = Arc::new(Snapshot::empty(self.kind, self.dimension()));
        self.faulted.store(false, Ordering::SeqCst);

        if let Err(e) = self.persist(&self.snapshot()) {
            tracing::warn!("Failed to persist reset index: {e}");
        }
        tracing::info!("Index reset");
    }

    /// Persist the current state. Refuses to write a mismatched pair.
    pub fn save(&self) -> Result<()> {
        let snapshot = self.snapshot();
        if !snapshot.is_consistent() {
            return Err(snapshot.fault());
        }
        self.persist(&snapshot)
    }

    /// Re-read the persisted pair. A mismatched pair is reported and not
    /// installed; the in-memory state stays as it was.
    pub async fn reload(&self) -> Result<UpsertResult> {
        let _guard = self.writer.lock().await;

        let snapshot = load_snapshot(self.kind, self.dimension(), &self.paths)?;
        if !snapshot.is_consistent() {
            tracing::error!(
                "Refusing to install persisted state: {} vectors vs {} records",
                snapshot.vector_count(),
                snapshot.record_count()
            );
            return Err(snapshot.fault());
        }

        let total = snapshot.record_count();
        *self.current.write() = Arc::new(snapshot);
        self.faulted.store(false, Ordering::SeqCst);
        tracing::info!("Index reloaded: {total} records");

        Ok(UpsertResult {
            added: 0,
            removed: 0,
            total,
        })
    }

    async fn build_index(&self, records: &RecordStore) -> Result<Box<dyn VectorIndex>> {
        let mut index = self.kind.empty(self.dimension());
        if records.is_empty() {
            tracing::info!("Created empty index");
            return Ok(index);
        }

        let texts = records.texts();
        tracing::info!("Embedding {} texts...", texts.len());
        let started = Instant::now();
        let vectors = self.embedder.embed(&texts).await?;
        let secs = started.elapsed().as_secs_f64();
        tracing::info!(
            "Embedded {} texts in {secs:.2}s ({:.1} texts/s)",
            texts.len(),
            texts.len() as f64 / secs.max(f64::EPSILON)
        );

        if vectors.len() != texts.len() {
            return Err(ServiceError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        index.add(&vectors)?;
        tracing::info!(
            vectors = index.len(),
            dimension = index.dimension(),
            index_type = %self.kind,
            "Index rebuilt"
        );
        Ok(index)
    }

    /// Vectors first, then records: a crash in between leaves a count
    /// mismatch that the next load reports.
    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        snapshot.index.persist(&self.paths.vectors)?;
        snapshot.records.save(&self.paths.records)?;
        tracing::info!("Saved: {} vectors", snapshot.vector_count());
        Ok(())
    }

    fn mark_faulted(&self, snapshot: &Snapshot) {
        self.faulted.store(true, Ordering::SeqCst);
        tracing::error!(
            "Consistency fault: {} vectors vs {} records; writes disabled until reset or reload",
            snapshot.vector_count(),
            snapshot.record_count()
        );
    }
}

fn load_snapshot(kind: IndexKind, dimension: usize, paths: &SnapshotPaths) -> Result<Snapshot> {
    let index = if paths.vectors.exists() {
        tracing::info!("Loading index from {}", paths.vectors.display());
        kind.load(&paths.vectors, dimension)?
    } else {
        tracing::info!("Creating new {kind} index");
        kind.empty(dimension)
    };

    if index.dimension() != dimension {
        return Err(ServiceError::Index(format!(
            "persisted index has dimension {}, embedder produces {dimension}",
            index.dimension()
        )));
    }

    let records = RecordStore::load(&paths.records)?;
    let snapshot = Snapshot { index, records };

    if !snapshot.is_consistent() {
        tracing::error!(
            "MISMATCH on load: {} vectors vs {} records (corrupted prior save?)",
            snapshot.vector_count(),
            snapshot.record_count()
        );
    }
    Ok(snapshot)
}

fn validate_batch(batch: &[Record]) -> Result<()> {
    if batch.is_empty() {
        return Err(ServiceError::Validation(
            "at least one item is required".to_string(),
        ));
    }
    for (i, record) in batch.iter().enumerate() {
        if record.id.trim().is_empty() {
            return Err(ServiceError::Validation(format!("item {i} has an empty id")));
        }
        if record.text.trim().is_empty() {
            return Err(ServiceError::Validation(format!(
                "item {i} ({}) has empty text",
                record.id
            )));
        }
    }
    Ok(())
}

/// Keep only the last occurrence of each id, at that occurrence's position.
fn dedupe_last_wins(batch: Vec<Record>) -> Vec<Record> {
    let last: HashMap<String, usize> = batch
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();
    batch
        .into_iter()
        .enumerate()
        .filter(|(i, r)| last.get(&r.id) == Some(i))
        .map(|(_, r)| r)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_last_occurrence_in_place() {
        let batch = vec![
            Record::new("a", "zone", "first a"),
            Record::new("b", "zone", "b"),
            Record::new("a", "poi", "second a"),
        ];
        let deduped = dedupe_last_wins(batch);
        let ids: Vec<&str> = deduped.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(deduped[1].text, "second a");
    }

    #[test]
    fn test_validate_rejects_empty_batch_and_fields() {
        assert!(matches!(
            validate_batch(&[]),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            validate_batch(&[Record::new("", "zone", "text")]),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            validate_batch(&[Record::new("a", "zone", "  ")]),
            Err(ServiceError::Validation(_))
        ));
        assert!(validate_batch(&[Record::new("a", "zone", "text")]).is_ok());
    }

    #[test]
    fn test_load_snapshot_uses_configured_variant() {
        let dir = tempfile::tempdir().unwrap();
        for kind in [IndexKind::Flat, IndexKind::Hnsw] {
            let paths = SnapshotPaths {
                vectors: dir.path().join(kind.file_name()),
                records: dir.path().join(format!("records-{kind}.json")),
            };

            let fresh = load_snapshot(kind, 2, &paths).unwrap();
            assert_eq!(fresh.index.kind(), kind);
            assert_eq!(fresh.vector_count(), 0);

            let mut index = kind.empty(2);
            index.add(&[vec![1.0, 0.0]]).unwrap();
            index.persist(&paths.vectors).unwrap();
            RecordStore::from_records(vec![Record::new("a", "zone", "x")])
                .save(&paths.records)
                .unwrap();

            let loaded = load_snapshot(kind, 2, &paths).unwrap();
            assert_eq!(loaded.index.kind(), kind);
            assert!(loaded.is_consistent());
            assert_eq!(loaded.vector_count(), 1);
        }
    }

    #[test]
    fn test_snapshot_consistency() {
        let mut snapshot = Snapshot::empty(IndexKind::Flat, 2);
        assert!(snapshot.is_consistent());
        snapshot.index.add(&[vec![1.0, 0.0]]).unwrap();
        assert!(!snapshot.is_consistent());
        assert!(matches!(
            snapshot.fault(),
            ServiceError::ConsistencyFault { vectors: 1, records: 0 }
        ));
    }
}
