use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::{Result, ServiceError};
use crate::search::{tmp_path, write_atomic};

/// Graph connectivity (M) for the HNSW variant.
const HNSW_CONNECTIVITY: usize = 32;
/// Build-time search depth (ef_construction)
const HNSW_EXPANSION_ADD: usize = 200;
/// Query-time search depth (ef_search)
const HNSW_EXPANSION_SEARCH: usize = 100;

/// A single nearest-neighbour hit: similarity plus the slot it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub score: f32,
    pub position: usize,
}

/// Supported index variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexKind {
    /// Exact inner-product search over every stored vector.
    Flat,
    /// Approximate inner-product search over an HNSW graph.
    Hnsw,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Flat => "FLAT",
            IndexKind::Hnsw => "HNSW",
        }
    }

    /// File name of the persisted index inside the index directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            IndexKind::Flat => "vectors.json",
            IndexKind::Hnsw => "vectors.usearch",
        }
    }

    /// Construct an empty index of this variant.
    pub fn empty(&self, dimension: usize) -> Box<dyn VectorIndex> {
        match self {
            IndexKind::Flat => Box::new(FlatIndex::new(dimension)),
            IndexKind::Hnsw => Box::new(HnswIndex::new(dimension)),
        }
    }

    /// Load a persisted index of this variant.
    pub fn load(&self, path: &Path, dimension: usize) -> Result<Box<dyn VectorIndex>> {
        match self {
            IndexKind::Flat => Ok(Box::new(FlatIndex::load(path)?)),
            IndexKind::Hnsw => Ok(Box::new(HnswIndex::load(path, dimension)?)),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FLAT" => Ok(IndexKind::Flat),
            "HNSW" => Ok(IndexKind::Hnsw),
            other => anyhow::bail!("Unsupported index type: {other}"),
        }
    }
}

/// Similarity index over fixed-dimension, L2-normalised vectors.
///
/// Append-only: there is no per-slot delete or update, so any removal means
/// rebuilding a fresh index. Positions are assigned in insertion order
/// starting at zero.
pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> IndexKind;

    fn dimension(&self) -> usize;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors; fails without modifying the index if any has the wrong dimension.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()>;

    /// Up to `k` neighbours ordered by descending similarity.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Write the index to `path`.
    fn persist(&self, path: &Path) -> Result<()>;
}

/// Exact inner-product index. Vectors are expected to be normalised, so the
/// inner product equals cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let index: FlatIndex = serde_json::from_str(&data)?;
        if let Some(bad) = index.vectors.iter().find(|v| v.len() != index.dimension) {
            return Err(ServiceError::Index(format!(
                "persisted vector has dimension {}, index declares {}",
                bad.len(),
                index.dimension
            )));
        }
        Ok(index)
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(ServiceError::Index(format!(
                "dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.len()
            )));
        }
        self.vectors.extend(vectors.iter().cloned());
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(ServiceError::Index(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }

        let mut scored: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| Neighbor {
                score: inner_product(query, v),
                position,
            })
            .collect();

        // Ties broken by insertion order
        sort_neighbors(&mut scored);
        scored.truncate(k);
        Ok(scored)
    }

    fn persist(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string(self)?;
        write_atomic(path, data.as_bytes())
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });
}

// ─── HNSW (usearch) ──────────────────────────────────────

fn hnsw_options(dimension: usize) -> IndexOptions {
    IndexOptions {
        dimensions: dimension,
        metric: MetricKind::IP,
        quantization: ScalarKind::F32,
        connectivity: HNSW_CONNECTIVITY,
        expansion_add: HNSW_EXPANSION_ADD,
        expansion_search: HNSW_EXPANSION_SEARCH,
        multi: false,
    }
}

fn new_native(dimension: usize) -> Result<Index> {
    Index::new(&hnsw_options(dimension)).map_err(|e| ServiceError::Index(e.to_string()))
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| ServiceError::Index(format!("invalid path encoding: {}", path.display())))
}

fn insert_from(index: &Index, start: usize, vectors: &[Vec<f32>]) -> Result<()> {
    index
        .reserve(start + vectors.len())
        .map_err(|e| ServiceError::Index(e.to_string()))?;
    for (offset, v) in vectors.iter().enumerate() {
        index
            .add((start + offset) as u64, v.as_slice())
            .map_err(|e| ServiceError::Index(e.to_string()))?;
    }
    Ok(())
}

/// Approximate index over a usearch HNSW graph. Keys are slot positions.
///
/// The native index is created on first insert, so an empty index costs
/// nothing and construction cannot fail.
pub struct HnswIndex {
    dimension: usize,
    index: Option<Index>,
}

impl HnswIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            index: None,
        }
    }

    pub fn load(path: &Path, dimension: usize) -> Result<Self> {
        let index = new_native(dimension)?;
        index
            .load(path_str(path)?)
            .map_err(|e| ServiceError::Index(format!("failed to load {}: {e}", path.display())))?;
        if index.dimensions() != dimension {
            return Err(ServiceError::Index(format!(
                "persisted index has dimension {}, expected {dimension}",
                index.dimensions()
            )));
        }
        Ok(Self {
            dimension,
            index: Some(index),
        })
    }
}

impl VectorIndex for HnswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.index.as_ref().map_or(0, |i| i.size())
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(ServiceError::Index(format!(
                "dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.len()
            )));
        }
        if vectors.is_empty() {
            return Ok(());
        }

        let index = match self.index.take() {
            Some(index) => index,
            None => new_native(self.dimension)?,
        };
        let result = insert_from(&index, index.size(), vectors);
        self.index = Some(index);
        result
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(ServiceError::Index(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        let Some(index) = self.index.as_ref() else {
            return Ok(Vec::new());
        };
        if k == 0 || index.size() == 0 {
            return Ok(Vec::new());
        }

        let matches = index
            .search(query, k)
            .map_err(|e| ServiceError::Index(e.to_string()))?;

        // IP distance is 1 - dot
        let mut neighbors: Vec<Neighbor> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(&key, &distance)| Neighbor {
                score: 1.0 - distance,
                position: key as usize,
            })
            .collect();
        sort_neighbors(&mut neighbors);
        Ok(neighbors)
    }

    fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(path);
        let tmp_str = path_str(&tmp)?;
        match self.index.as_ref() {
            Some(index) => index.save(tmp_str),
            None => new_native(self.dimension)?.save(tmp_str),
        }
        .map_err(|e| ServiceError::Index(format!("failed to save {}: {e}", path.display())))?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
