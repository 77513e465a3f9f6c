//! # vibe-search
//!
//! A semantic search index service. A vector index and an ordered record
//! store are kept in lock-step, and two query paths read from them: plain
//! nearest-neighbour search and a hybrid search that re-ranks by lexical
//! "vibe" matches.
//!
//! ## Write path
//!
//! ```text
//!        upsert(batch)
//!             │
//!             ▼
//!   ┌───────────────────┐
//!   │ drop replaced ids │  survivors keep their order,
//!   │ append the batch  │  batch appended in input order
//!   └─────────┬─────────┘
//!             ▼
//!   ┌───────────────────┐
//!   │ re-embed the whole│  no per-slot delete in the index,
//!   │ merged record set │  so every vector is regenerated
//!   └─────────┬─────────┘
//!             ▼
//!   ┌───────────────────┐
//!   │ fresh index built │  off to the side; readers still
//!   │ + count check     │  see the previous snapshot
//!   └─────────┬─────────┘
//!             ▼
//!   ┌───────────────────┐
//!   │ swap snapshot Arc │  the only moment readers are excluded
//!   └─────────┬─────────┘
//!             ▼
//!   ┌───────────────────┐
//!   │ persist + verify  │  mismatch => engine faulted
//!   └───────────────────┘
//! ```
//!
//! ## Hybrid read path
//!
//! ```text
//!   free_text + tags ──► composed query ──► embed ──► top_k × 3 neighbours
//!                                                          │
//!        ┌─────────────────────────────────────────────────┘
//!        ▼
//!   avoid terms (drop) ──► hard filters (drop) ──► score × boost^matches
//!                                                          │
//!                                      sort desc, keep top_k ◄┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, data dir, index and embedding settings
//! - [`error`] - `ServiceError` taxonomy and its HTTP status mapping
//! - [`models`] - `Record`, hits, filters, request/response types
//! - [`llm::embeddings`] - `EmbeddingProvider` trait, HTTP (Ollama / OpenAI) and hashing providers
//! - [`search::vector`] - `VectorIndex` trait, exact `FlatIndex` and usearch-backed `HnswIndex`
//! - [`search::store`] - Positionally aligned record store
//! - [`search::sync`] - `SyncEngine`: rebuild-on-write, snapshot swap, load/save, fault tracking
//! - [`search::retrieval`] - Plain search with post-hoc filtering
//! - [`search::hybrid`] - Query composition, overfetch, exclusion and vibe boosting
//! - [`search::report`] - Read-only consistency report
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
