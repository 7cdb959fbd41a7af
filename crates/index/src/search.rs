use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::backend::VectorStore;
use crate::types::{FieldCondition, PayloadFilter, ScoredRecord, VectorQuery};
use crate::{IndexError, COLLECTION_PREFIX};

/// Optional narrowing for a template search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub domain: Option<String>,
    pub difficulty: Option<i64>,
    #[serde(default)]
    pub exclude_ids: Vec<String>,
}

impl SearchFilters {
    /// `must`: domain and difficulty when given. `must_not`: `questionId` in the excluded ids.
    pub fn to_payload_filter(&self) -> Option<PayloadFilter> {
        let mut filter = PayloadFilter::default();
        if let Some(domain) = &self.domain {
            filter.must.push(FieldCondition::keyword("domain", domain.clone()));
        }
        if let Some(difficulty) = self.difficulty {
            filter.must.push(FieldCondition::integer("difficulty", difficulty));
        }
        if !self.exclude_ids.is_empty() {
            filter
                .must_not
                .push(FieldCondition::any_keyword("questionId", self.exclude_ids.clone()));
        }
        (!filter.is_empty()).then_some(filter)
    }
}

/// One similarity match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The stored `questionId` when present, otherwise the backend point id.
    pub id: String,
    pub score: f32,
    /// Full payload as stored.
    pub metadata: Value,
}

impl From<ScoredRecord> for SearchHit {
    fn from(record: ScoredRecord) -> Self {
        let id = record
            .payload
            .get("questionId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or(record.id);
        SearchHit {
            id,
            score: record.score,
            metadata: Value::Object(record.payload),
        }
    }
}

/// Read side of the vector store: nearest-neighbour queries with payload filters.
#[derive(Clone)]
pub struct SearchClient {
    store: Arc<dyn VectorStore>,
    prefix: String,
    dimension: Option<usize>,
}

impl SearchClient {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            prefix: COLLECTION_PREFIX.to_string(),
            dimension: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Query vectors of any other width are refused without a round trip.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Top `limit` questions of a template, best first. No score threshold is applied here.
    /// Failures are logged and produce an empty list.
    pub async fn search(
        &self,
        template_id: &str,
        query_vector: Vec<f32>,
        limit: usize,
        filters: Option<&SearchFilters>,
    ) -> Vec<SearchHit> {
        let name = format!("{}{template_id}", self.prefix);
        let query = VectorQuery {
            vector: query_vector,
            limit: limit as u64,
            filter: filters.and_then(SearchFilters::to_payload_filter),
            score_threshold: None,
        };
        match self.run(&name, &query).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(collection = %name, error = %err, "similarity search failed");
                Vec::new()
            }
        }
    }

    /// Query an arbitrary collection (e.g. the reference corpus) with a server-side score
    /// threshold. Errors are returned to the caller.
    pub async fn search_collection(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let query = VectorQuery {
            vector: query_vector,
            limit: limit as u64,
            filter: None,
            score_threshold,
        };
        self.run(collection, &query).await
    }

    async fn run(&self, collection: &str, query: &VectorQuery) -> Result<Vec<SearchHit>, IndexError> {
        if let Some(expected) = self.dimension {
            if query.vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query.vector.len(),
                });
            }
        }
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<SearchHit> = self
            .store
            .search(collection, query)
            .await?
            .into_iter()
            .map(SearchHit::from)
            .collect();
        hits.truncate(query.limit as usize);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryStore;
    use crate::types::{CollectionSpec, PointRecord};
    use serde_json::json;

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_collection("practice-test-otr", &CollectionSpec::cosine(2))
            .await
            .unwrap();
        let points = vec![
            ("p1", "q1", "Intervention", 2, vec![1.0, 0.0]),
            ("p2", "q2", "Intervention", 3, vec![0.9, 0.1]),
            ("p3", "q3", "Evaluation", 2, vec![0.8, 0.2]),
            ("p4", "q4", "Intervention", 2, vec![0.0, 1.0]),
        ]
        .into_iter()
        .map(|(pid, qid, domain, difficulty, vector)| PointRecord {
            id: pid.into(),
            vector,
            payload: json!({ "questionId": qid, "domain": domain, "difficulty": difficulty })
                .as_object()
                .cloned()
                .unwrap(),
        })
        .collect();
        store.upsert("practice-test-otr", points, true).await.unwrap();
        store
    }

    #[test]
    fn filters_translate_only_given_fields() {
        assert!(SearchFilters::default().to_payload_filter().is_none());

        let filters = SearchFilters {
            domain: Some("Intervention".into()),
            difficulty: None,
            exclude_ids: vec!["q1".into()],
        };
        let filter = filters.to_payload_filter().unwrap();
        assert_eq!(filter.must, vec![FieldCondition::keyword("domain", "Intervention")]);
        assert_eq!(
            filter.must_not,
            vec![FieldCondition::any_keyword("questionId", vec!["q1".into()])]
        );
    }

    #[tokio::test]
    async fn results_are_ordered_and_ids_come_from_payload() {
        let client = SearchClient::new(seeded_store().await);
        let hits = client.search("otr", vec![1.0, 0.0], 3, None).await;
        assert_eq!(
            hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(),
            vec!["q1", "q2", "q3"]
        );
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].metadata["domain"], "Intervention");
    }

    #[tokio::test]
    async fn filters_restrict_and_exclude() {
        let client = SearchClient::new(seeded_store().await);
        let filters = SearchFilters {
            domain: Some("Intervention".into()),
            difficulty: Some(2),
            exclude_ids: vec!["q1".into()],
        };
        let hits = client.search("otr", vec![1.0, 0.0], 10, Some(&filters)).await;
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["q4"]);
    }

    #[tokio::test]
    async fn no_threshold_at_template_level() {
        let client = SearchClient::new(seeded_store().await);
        let hits = client.search("otr", vec![0.0, 1.0], 10, None).await;
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn failures_are_empty() {
        let client = SearchClient::new(seeded_store().await);
        assert!(client.search("missing", vec![1.0, 0.0], 3, None).await.is_empty());

        let guarded = SearchClient::new(seeded_store().await).with_dimension(2);
        assert!(guarded.search("otr", vec![1.0, 0.0, 0.0], 3, None).await.is_empty());
    }

    #[tokio::test]
    async fn collection_search_applies_threshold() {
        let client = SearchClient::new(seeded_store().await);
        let hits = client
            .search_collection("practice-test-otr", vec![0.0, 1.0], 10, Some(0.3))
            .await
            .unwrap();
        // p3 scores ~0.24, below the threshold
        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["q4"]);
        assert!(client
            .search_collection("missing", vec![1.0, 0.0], 3, None)
            .await
            .is_err());
    }

    #[test]
    fn hit_falls_back_to_point_id() {
        let hit = SearchHit::from(ScoredRecord {
            id: "uuid-1".into(),
            score: 0.5,
            payload: json!({ "title": "x" }).as_object().cloned().unwrap(),
        });
        assert_eq!(hit.id, "uuid-1");
    }
}
