use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::query::rank_points;
use crate::types::{CollectionSpec, Payload, PointRecord, ScoredRecord, VectorQuery};
use crate::IndexError;

/// Collection-oriented vector database operations.
/// This allows for different storage implementations (Qdrant, in-memory).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Names of every collection in the store.
    async fn list_collections(&self) -> Result<Vec<String>, IndexError>;
    /// Creates `name`. Fails with [`IndexError::AlreadyExists`] when it is already there.
    async fn create_collection(&self, name: &str, spec: &CollectionSpec) -> Result<(), IndexError>;
    async fn delete_collection(&self, name: &str) -> Result<(), IndexError>;
    /// Inserts or replaces points. With `wait` the call returns once the write is applied.
    async fn upsert(&self, name: &str, points: Vec<PointRecord>, wait: bool) -> Result<(), IndexError>;
    /// Nearest neighbours of `query.vector`, best first.
    async fn search(&self, name: &str, query: &VectorQuery) -> Result<Vec<ScoredRecord>, IndexError>;
    /// Number of points the backend reports for `name`.
    async fn point_count(&self, name: &str) -> Result<u64, IndexError>;
    /// Payloads of up to `limit` points.
    async fn scroll(&self, name: &str, limit: usize) -> Result<Vec<Payload>, IndexError>;
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use index::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Qdrant over gRPC
/// let config = BackendConfig::qdrant("http://localhost:6334", None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Qdrant server. `timeout_secs` bounds every request.
    Qdrant {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Process-local store. Useful for tests and demos.
    #[default]
    InMemory,
}

fn default_timeout_secs() -> u64 {
    10
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn qdrant<U: Into<String>>(url: U, api_key: Option<String>) -> Self {
        BackendConfig::Qdrant {
            url: url.into(),
            api_key,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Build the backend described by this configuration.
    pub fn build(&self) -> Result<Arc<dyn VectorStore>, IndexError> {
        match self {
            BackendConfig::InMemory => Ok(Arc::new(InMemoryStore::new())),
            BackendConfig::Qdrant {
                url,
                api_key,
                timeout_secs,
            } => Ok(Arc::new(QdrantStore::connect(
                url,
                api_key.as_deref(),
                std::time::Duration::from_secs((*timeout_secs).max(1)),
            )?)),
        }
    }
}

#[derive(Default)]
struct MemoryCollection {
    spec: Option<CollectionSpec>,
    points: HashMap<String, (Vec<f32>, Payload)>,
}

/// An in-memory store using a `RwLock` around a `HashMap` of collections.
///
/// Counts `create_collection` calls so callers can check idempotency.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    create_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `create_collection` has been invoked (successful or not).
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        let guard = self
            .collections
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str, spec: &CollectionSpec) -> Result<(), IndexError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self
            .collections
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        if guard.contains_key(name) {
            return Err(IndexError::AlreadyExists(name.to_string()));
        }
        guard.insert(
            name.to_string(),
            MemoryCollection {
                spec: Some(spec.clone()),
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        self.collections
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))
    }

    async fn upsert(&self, name: &str, points: Vec<PointRecord>, _wait: bool) -> Result<(), IndexError> {
        // A single write lock is held for the entire batch.
        let mut guard = self
            .collections
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        let collection = guard
            .get_mut(name)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;

        if let Some(expected) = collection.spec.as_ref().map(|s| s.dimension) {
            if let Some(bad) = points.iter().find(|p| p.vector.len() != expected) {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: bad.vector.len(),
                });
            }
        }

        for point in points {
            collection.points.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(&self, name: &str, query: &VectorQuery) -> Result<Vec<ScoredRecord>, IndexError> {
        let guard = self
            .collections
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        let collection = guard
            .get(name)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;

        if let Some(expected) = collection.spec.as_ref().map(|s| s.dimension) {
            if query.vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query.vector.len(),
                });
            }
        }

        Ok(rank_points(
            collection
                .points
                .iter()
                .map(|(id, (vector, payload))| (id, vector, payload)),
            query,
        ))
    }

    async fn point_count(&self, name: &str) -> Result<u64, IndexError> {
        let guard = self
            .collections
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        guard
            .get(name)
            .map(|c| c.points.len() as u64)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))
    }

    async fn scroll(&self, name: &str, limit: usize) -> Result<Vec<Payload>, IndexError> {
        let guard = self
            .collections
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        let collection = guard
            .get(name)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))?;
        let mut ids: Vec<&String> = collection.points.keys().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .take(limit)
            .filter_map(|id| collection.points.get(id).map(|(_, p)| p.clone()))
            .collect())
    }
}

/// The Qdrant backend implementation.
pub mod qdrant;

pub use qdrant::QdrantStore;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: &str, vector: Vec<f32>) -> PointRecord {
        PointRecord {
            id: id.into(),
            vector,
            payload: json!({ "questionId": id }).as_object().cloned().unwrap(),
        }
    }

    #[tokio::test]
    async fn create_twice_reports_already_exists() {
        let store = InMemoryStore::new();
        store.create_collection("c", &CollectionSpec::cosine(2)).await.unwrap();
        let err = store
            .create_collection("c", &CollectionSpec::cosine(2))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::AlreadyExists(_)));
        assert_eq!(store.create_calls(), 2);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_counts() {
        let store = InMemoryStore::new();
        store.create_collection("c", &CollectionSpec::cosine(2)).await.unwrap();
        store
            .upsert("c", vec![point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])], true)
            .await
            .unwrap();
        store.upsert("c", vec![point("a", vec![0.5, 0.5])], true).await.unwrap();
        assert_eq!(store.point_count("c").await.unwrap(), 2);
        assert_eq!(store.scroll("c", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let store = InMemoryStore::new();
        store.create_collection("c", &CollectionSpec::cosine(3)).await.unwrap();
        let err = store.upsert("c", vec![point("a", vec![1.0])], true).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 1 }));

        let query = VectorQuery {
            vector: vec![1.0],
            limit: 3,
            filter: None,
            score_threshold: None,
        };
        assert!(store.search("c", &query).await.is_err());
    }

    #[tokio::test]
    async fn missing_collection_errors() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.point_count("nope").await,
            Err(IndexError::CollectionNotFound(_))
        ));
        assert!(store.delete_collection("nope").await.is_err());
    }

    #[test]
    fn backend_config_deserializes_tagged() {
        let cfg: BackendConfig =
            serde_json::from_value(json!({ "kind": "qdrant", "url": "http://localhost:6334" }))
                .unwrap();
        assert_eq!(cfg, BackendConfig::qdrant("http://localhost:6334", None));
        let cfg: BackendConfig = serde_json::from_value(json!({ "kind": "in_memory" })).unwrap();
        assert_eq!(cfg, BackendConfig::InMemory);
    }
}
