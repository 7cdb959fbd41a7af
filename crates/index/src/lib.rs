//! # Remediation Index
//!
//! Vector storage for practice-test questions and the reference corpus.
//!
//! ## Core pieces
//!
//! - **Pluggable backends**: everything talks to a [`VectorStore`]. Out of the box:
//!   - [`QdrantStore`] for production (gRPC, bounded by a per-request timeout).
//!   - [`InMemoryStore`], a brute-force cosine store for tests and demos.
//! - **[`CollectionManager`]**: one collection per exam template, named
//!   `practice-test-<templateId>`, created lazily and idempotently (cosine distance,
//!   2 segments, replication factor 1). Upserts go in batches of 100 and wait for each
//!   batch. Also produces the domain/difficulty/type histograms used by the admin endpoints.
//! - **[`SearchClient`]**: filtered nearest-neighbour queries over a template collection,
//!   plus a thresholded variant for arbitrary collections like `nbcot_sources`.
//!
//! Manager and search operations never fail outward: backend errors are logged with
//! `tracing::warn!` and turned into `false`, `0` or an empty list.
//!
//! ## Example Usage
//!
//! ```
//! use index::{CollectionManager, InMemoryStore, QuestionMetadata, QuestionVector, SearchClient};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemoryStore::new());
//! let manager = CollectionManager::new(store.clone(), 2);
//!
//! let inserted = manager
//!     .upsert(
//!         "nbcot-otr",
//!         vec![QuestionVector {
//!             id: "q1".into(),
//!             vector: vec![1.0, 0.0],
//!             metadata: QuestionMetadata {
//!                 question_id: "q1".into(),
//!                 source_id: None,
//!                 question_type: "SINGLE_BEST".into(),
//!                 domain: "Intervention".into(),
//!                 difficulty: 2,
//!                 stem: "Which splint?".into(),
//!                 rationale: None,
//!                 tags: vec![],
//!                 exam_template: Some("nbcot-otr".into()),
//!                 created_at: "2024-01-01T00:00:00Z".into(),
//!             },
//!         }],
//!     )
//!     .await;
//! assert_eq!(inserted, 1);
//!
//! let hits = SearchClient::new(store).search("nbcot-otr", vec![1.0, 0.0], 5, None).await;
//! assert_eq!(hits[0].id, "q1");
//! # });
//! ```

mod backend;
mod collections;
mod query;
mod search;
mod types;

use thiserror::Error;

pub use crate::backend::{BackendConfig, InMemoryStore, QdrantStore, VectorStore};
pub use crate::collections::{
    CollectionManager, DomainCount, ExamAnalysis, LevelCount, QuestionMetadata, QuestionVector,
    TemplateMetadata, TypeCount,
};
pub use crate::search::{SearchClient, SearchFilters, SearchHit};
pub use crate::types::{
    CollectionSpec, Distance, FieldCondition, MatchValue, Payload, PayloadFilter, PointRecord,
    ScoredRecord, VectorQuery,
};

/// Per-template collections are named `practice-test-<templateId>`.
pub const COLLECTION_PREFIX: &str = "practice-test-";
/// Reference-corpus collection searched before the question bank.
pub const DEFAULT_REFERENCE_COLLECTION: &str = "nbcot_sources";
pub const UPSERT_BATCH_SIZE: usize = 100;
pub const DEFAULT_SEGMENT_NUMBER: u64 = 2;
pub const DEFAULT_REPLICATION_FACTOR: u32 = 1;

/// Custom error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    #[error("Collection already exists: {0}")]
    AlreadyExists(String),
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_helper_formats_display() {
        let err = IndexError::backend("status: Unavailable");
        assert_eq!(err.to_string(), "Backend error: status: Unavailable");
    }

    #[test]
    fn dimension_mismatch_message() {
        let err = IndexError::DimensionMismatch {
            expected: 1536,
            actual: 384,
        };
        assert_eq!(
            err.to_string(),
            "Vector dimension mismatch: expected 1536, got 384"
        );
    }
}
