use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::VectorStore;
use crate::types::{CollectionSpec, Payload, PointRecord};
use crate::{IndexError, COLLECTION_PREFIX, UPSERT_BATCH_SIZE};

/// Payload stored alongside every question vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionMetadata {
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// `SINGLE_BEST`, `MULTI_SELECT`, ...
    #[serde(rename = "type")]
    pub question_type: String,
    pub domain: String,
    pub difficulty: i64,
    pub stem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_template: Option<String>,
    pub created_at: String,
}

/// A question ready to be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionVector {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: QuestionMetadata,
}

impl QuestionVector {
    fn into_point(self) -> Result<PointRecord, IndexError> {
        let payload = match serde_json::to_value(&self.metadata) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(IndexError::InvalidPayload("metadata is not an object".into())),
            Err(err) => return Err(IndexError::InvalidPayload(err.to_string())),
        };
        Ok(PointRecord {
            id: self.id,
            vector: self.vector,
            payload,
        })
    }
}

/// Histograms over a template collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamAnalysis {
    pub total_questions: u64,
    pub domains: BTreeMap<String, u64>,
    /// Keyed `level-<difficulty>`.
    pub difficulty_distribution: BTreeMap<String, u64>,
    pub question_types: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub question_type: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelCount {
    pub level: i64,
    pub count: u64,
}

/// What a template offers: domains and types by frequency, difficulty levels ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    pub domains: Vec<DomainCount>,
    pub question_types: Vec<TypeCount>,
    pub difficulty_levels: Vec<LevelCount>,
    pub total_questions: u64,
}

/// Owns the lifecycle of the per-template collections (`practice-test-<templateId>`).
///
/// Every operation logs and absorbs backend failures, returning a neutral value
/// (`false`, `0`, empty) instead of an error.
#[derive(Clone)]
pub struct CollectionManager {
    store: Arc<dyn VectorStore>,
    prefix: String,
    spec: CollectionSpec,
    batch_size: usize,
}

impl CollectionManager {
    pub fn new(store: Arc<dyn VectorStore>, dimension: usize) -> Self {
        Self {
            store,
            prefix: COLLECTION_PREFIX.to_string(),
            spec: CollectionSpec::cosine(dimension),
            batch_size: UPSERT_BATCH_SIZE,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn dimension(&self) -> usize {
        self.spec.dimension
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn collection_name(&self, template_id: &str) -> String {
        format!("{}{template_id}", self.prefix)
    }

    /// Makes sure the template collection exists. `true` when it exists afterwards.
    pub async fn ensure_collection(&self, template_id: &str) -> bool {
        let name = self.collection_name(template_id);
        match self.try_ensure(&name).await {
            Ok(created) => {
                if created {
                    tracing::info!(collection = %name, dimension = self.spec.dimension, "created collection");
                } else {
                    tracing::debug!(collection = %name, "collection already exists");
                }
                true
            }
            Err(err) => {
                tracing::warn!(collection = %name, error = %err, "failed to ensure collection");
                false
            }
        }
    }

    async fn try_ensure(&self, name: &str) -> Result<bool, IndexError> {
        let existing = self.store.list_collections().await?;
        if existing.iter().any(|c| c == name) {
            return Ok(false);
        }
        match self.store.create_collection(name, &self.spec).await {
            Ok(()) => Ok(true),
            // Lost a creation race with another writer; the collection is there.
            Err(IndexError::AlreadyExists(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Writes `records` in batches, waiting for each batch. Returns how many records were in
    /// batches that succeeded; stops at the first failed batch and keeps earlier ones.
    pub async fn upsert(&self, template_id: &str, records: Vec<QuestionVector>) -> usize {
        let name = self.collection_name(template_id);
        if !self.ensure_collection(template_id).await {
            return 0;
        }

        let mut inserted = 0usize;
        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            let batch: Vec<QuestionVector> = records.by_ref().take(self.batch_size).collect();
            let batch_len = batch.len();
            match self.write_batch(&name, batch).await {
                Ok(()) => inserted += batch_len,
                Err(err) => {
                    tracing::warn!(
                        collection = %name,
                        inserted,
                        batch = batch_len,
                        error = %err,
                        "upsert batch failed; stopping"
                    );
                    return inserted;
                }
            }
        }

        tracing::info!(collection = %name, inserted, "upserted question vectors");
        inserted
    }

    async fn write_batch(&self, name: &str, batch: Vec<QuestionVector>) -> Result<(), IndexError> {
        if let Some(bad) = batch.iter().find(|r| r.vector.len() != self.spec.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.spec.dimension,
                actual: bad.vector.len(),
            });
        }
        let points = batch
            .into_iter()
            .map(QuestionVector::into_point)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.upsert(name, points, true).await
    }

    /// Domain, difficulty and type histograms for a template.
    pub async fn analyze(&self, template_id: &str) -> ExamAnalysis {
        let name = self.collection_name(template_id);
        match self.load_payloads(&name).await {
            Ok((total, payloads)) => build_analysis(total, &payloads),
            Err(err) => {
                tracing::warn!(collection = %name, error = %err, "failed to analyze collection");
                ExamAnalysis::default()
            }
        }
    }

    /// Sorted view of the same data as [`analyze`](Self::analyze).
    pub async fn template_metadata(&self, template_id: &str) -> TemplateMetadata {
        let name = self.collection_name(template_id);
        match self.load_payloads(&name).await {
            Ok((total, payloads)) => build_metadata(total, &payloads),
            Err(err) => {
                tracing::warn!(collection = %name, error = %err, "failed to read template metadata");
                TemplateMetadata::default()
            }
        }
    }

    async fn load_payloads(&self, name: &str) -> Result<(u64, Vec<Payload>), IndexError> {
        let total = self.store.point_count(name).await?;
        if total == 0 {
            return Ok((0, Vec::new()));
        }
        let payloads = self.store.scroll(name, total as usize).await?;
        Ok((total, payloads))
    }

    /// Template ids that have a collection.
    pub async fn list_collections(&self) -> Vec<String> {
        match self.store.list_collections().await {
            Ok(names) => names
                .into_iter()
                .filter_map(|name| name.strip_prefix(&self.prefix).map(str::to_string))
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to list collections");
                Vec::new()
            }
        }
    }

    pub async fn delete_collection(&self, template_id: &str) -> bool {
        let name = self.collection_name(template_id);
        match self.store.delete_collection(&name).await {
            Ok(()) => {
                tracing::info!(collection = %name, "deleted collection");
                true
            }
            Err(err) => {
                tracing::warn!(collection = %name, error = %err, "failed to delete collection");
                false
            }
        }
    }
}

fn non_empty_str<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Display form of the difficulty field: integers as-is, anything else as written.
fn difficulty_label(payload: &Payload) -> Option<String> {
    match payload.get("difficulty")? {
        Value::Null => None,
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn difficulty_level(payload: &Payload) -> Option<i64> {
    match payload.get("difficulty")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn build_analysis(total: u64, payloads: &[Payload]) -> ExamAnalysis {
    let mut analysis = ExamAnalysis {
        total_questions: total,
        ..Default::default()
    };
    for payload in payloads {
        if let Some(domain) = non_empty_str(payload, "domain") {
            *analysis.domains.entry(domain.to_string()).or_default() += 1;
        }
        if let Some(level) = difficulty_label(payload) {
            *analysis
                .difficulty_distribution
                .entry(format!("level-{level}"))
                .or_default() += 1;
        }
        if let Some(kind) = non_empty_str(payload, "type") {
            *analysis.question_types.entry(kind.to_string()).or_default() += 1;
        }
    }
    analysis
}

/// Count descending; ties keep name order so output is stable.
fn by_count_desc(counts: BTreeMap<String, u64>) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}

fn build_metadata(total: u64, payloads: &[Payload]) -> TemplateMetadata {
    let mut domains = BTreeMap::new();
    let mut types = BTreeMap::new();
    let mut levels: BTreeMap<i64, u64> = BTreeMap::new();

    for payload in payloads {
        if let Some(domain) = non_empty_str(payload, "domain") {
            *domains.entry(domain.to_string()).or_default() += 1;
        }
        if let Some(kind) = non_empty_str(payload, "type") {
            *types.entry(kind.to_string()).or_default() += 1;
        }
        if let Some(level) = difficulty_level(payload) {
            *levels.entry(level).or_default() += 1;
        }
    }

    TemplateMetadata {
        domains: by_count_desc(domains)
            .into_iter()
            .map(|(domain, count)| DomainCount { domain, count })
            .collect(),
        question_types: by_count_desc(types)
            .into_iter()
            .map(|(question_type, count)| TypeCount {
                question_type,
                count,
            })
            .collect(),
        difficulty_levels: levels
            .into_iter()
            .map(|(level, count)| LevelCount { level, count })
            .collect(),
        total_questions: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryStore;
    use crate::types::{ScoredRecord, VectorQuery};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn question(id: &str, domain: &str, difficulty: i64, kind: &str, vector: Vec<f32>) -> QuestionVector {
        QuestionVector {
            id: id.into(),
            vector,
            metadata: QuestionMetadata {
                question_id: id.into(),
                source_id: None,
                question_type: kind.into(),
                domain: domain.into(),
                difficulty,
                stem: format!("stem for {id}"),
                rationale: None,
                tags: vec![],
                exam_template: Some("nbcot-otr".into()),
                created_at: "2024-01-01T00:00:00Z".into(),
            },
        }
    }

    fn manager(store: Arc<InMemoryStore>, dim: usize) -> CollectionManager {
        CollectionManager::new(store, dim)
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = manager(store.clone(), 2);

        assert!(mgr.ensure_collection("otr").await);
        assert!(mgr.ensure_collection("otr").await);
        assert_eq!(store.create_calls(), 1);
        assert_eq!(mgr.list_collections().await, vec!["otr".to_string()]);
    }

    #[tokio::test]
    async fn list_strips_prefix_and_ignores_others() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_collection("nbcot_sources", &CollectionSpec::cosine(2))
            .await
            .unwrap();
        let mgr = manager(store, 2);
        mgr.ensure_collection("a").await;
        mgr.ensure_collection("b").await;
        assert_eq!(mgr.list_collections().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn upsert_batches_and_counts() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = manager(store.clone(), 2).with_batch_size(2);
        let records: Vec<QuestionVector> = (0..5)
            .map(|i| question(&format!("q{i}"), "Intervention", 1, "SINGLE_BEST", vec![1.0, i as f32]))
            .collect();

        assert_eq!(mgr.upsert("otr", records).await, 5);
        assert_eq!(store.point_count("practice-test-otr").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn upsert_stops_at_first_bad_batch() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = manager(store.clone(), 2).with_batch_size(2);
        let records = vec![
            question("q1", "A", 1, "SINGLE_BEST", vec![1.0, 0.0]),
            question("q2", "A", 1, "SINGLE_BEST", vec![0.0, 1.0]),
            question("q3", "A", 1, "SINGLE_BEST", vec![1.0, 0.0, 0.0]),
            question("q4", "A", 1, "SINGLE_BEST", vec![1.0, 1.0]),
            question("q5", "A", 1, "SINGLE_BEST", vec![1.0, 1.0]),
        ];

        assert_eq!(mgr.upsert("otr", records).await, 2);
        assert_eq!(store.point_count("practice-test-otr").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn analyze_builds_histograms() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = manager(store, 2);
        mgr.upsert(
            "otr",
            vec![
                question("q1", "Intervention", 2, "SINGLE_BEST", vec![1.0, 0.0]),
                question("q2", "Intervention", 3, "MULTI_SELECT", vec![0.0, 1.0]),
                question("q3", "Evaluation", 2, "SINGLE_BEST", vec![1.0, 1.0]),
            ],
        )
        .await;

        let analysis = mgr.analyze("otr").await;
        assert_eq!(analysis.total_questions, 3);
        assert_eq!(analysis.domains["Intervention"], 2);
        assert_eq!(analysis.difficulty_distribution["level-2"], 2);
        assert_eq!(analysis.difficulty_distribution["level-3"], 1);
        assert_eq!(analysis.question_types["SINGLE_BEST"], 2);

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["totalQuestions"], 3);
        assert!(json["difficultyDistribution"].get("level-2").is_some());
    }

    #[tokio::test]
    async fn analyze_missing_collection_is_empty() {
        let mgr = manager(Arc::new(InMemoryStore::new()), 2);
        assert_eq!(mgr.analyze("nope").await, ExamAnalysis::default());
    }

    #[test]
    fn analysis_skips_missing_fields() {
        let payloads: Vec<Payload> = vec![
            json!({ "domain": "A" }).as_object().cloned().unwrap(),
            json!({ "difficulty": 4 }).as_object().cloned().unwrap(),
            json!({ "type": "SINGLE_BEST", "domain": "" }).as_object().cloned().unwrap(),
            json!({}).as_object().cloned().unwrap(),
        ];
        let analysis = build_analysis(4, &payloads);
        assert_eq!(analysis.domains.len(), 1);
        assert_eq!(analysis.difficulty_distribution["level-4"], 1);
        assert_eq!(analysis.question_types["SINGLE_BEST"], 1);
    }

    #[test]
    fn metadata_orders_counts_and_levels() {
        let payloads: Vec<Payload> = [
            json!({ "domain": "B", "type": "MULTI_SELECT", "difficulty": 3 }),
            json!({ "domain": "A", "type": "SINGLE_BEST", "difficulty": 1 }),
            json!({ "domain": "A", "type": "SINGLE_BEST", "difficulty": "2" }),
        ]
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();

        let meta = build_metadata(3, &payloads);
        assert_eq!(meta.domains[0], DomainCount { domain: "A".into(), count: 2 });
        assert_eq!(meta.question_types[0].question_type, "SINGLE_BEST");
        assert_eq!(
            meta.difficulty_levels.iter().map(|l| l.level).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(meta.total_questions, 3);
    }

    /// Store whose listing always fails, to exercise the absorb-and-log paths.
    struct BrokenStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for BrokenStore {
        async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(IndexError::backend("connection refused"))
        }
        async fn create_collection(&self, _: &str, _: &CollectionSpec) -> Result<(), IndexError> {
            Err(IndexError::backend("connection refused"))
        }
        async fn delete_collection(&self, _: &str) -> Result<(), IndexError> {
            Err(IndexError::backend("connection refused"))
        }
        async fn upsert(&self, _: &str, _: Vec<PointRecord>, _: bool) -> Result<(), IndexError> {
            Err(IndexError::backend("connection refused"))
        }
        async fn search(&self, _: &str, _: &VectorQuery) -> Result<Vec<ScoredRecord>, IndexError> {
            Err(IndexError::backend("connection refused"))
        }
        async fn point_count(&self, _: &str) -> Result<u64, IndexError> {
            Err(IndexError::backend("connection refused"))
        }
        async fn scroll(&self, _: &str, _: usize) -> Result<Vec<Payload>, IndexError> {
            Err(IndexError::backend("connection refused"))
        }
    }

    #[tokio::test]
    async fn backend_failures_become_neutral_values() {
        let store = Arc::new(BrokenStore {
            calls: AtomicUsize::new(0),
        });
        let mgr = CollectionManager::new(store.clone(), 2);

        assert!(!mgr.ensure_collection("otr").await);
        assert_eq!(mgr.upsert("otr", vec![question("q", "A", 1, "SINGLE_BEST", vec![1.0, 0.0])]).await, 0);
        assert!(mgr.list_collections().await.is_empty());
        assert!(!mgr.delete_collection("otr").await);
        assert_eq!(mgr.template_metadata("otr").await, TemplateMetadata::default());
        assert!(store.calls.load(Ordering::SeqCst) >= 3);
    }

    /// Another writer created the collection between our listing and our create call.
    struct RacedStore {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl VectorStore for RacedStore {
        async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
            Ok(Vec::new())
        }
        async fn create_collection(&self, name: &str, _: &CollectionSpec) -> Result<(), IndexError> {
            Err(IndexError::AlreadyExists(name.to_string()))
        }
        async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
            self.inner.delete_collection(name).await
        }
        async fn upsert(&self, name: &str, points: Vec<PointRecord>, wait: bool) -> Result<(), IndexError> {
            self.inner.upsert(name, points, wait).await
        }
        async fn search(&self, name: &str, query: &VectorQuery) -> Result<Vec<ScoredRecord>, IndexError> {
            self.inner.search(name, query).await
        }
        async fn point_count(&self, name: &str) -> Result<u64, IndexError> {
            self.inner.point_count(name).await
        }
        async fn scroll(&self, name: &str, limit: usize) -> Result<Vec<Payload>, IndexError> {
            self.inner.scroll(name, limit).await
        }
    }

    #[tokio::test]
    async fn lost_create_race_still_counts_as_present() {
        let mgr = CollectionManager::new(
            Arc::new(RacedStore {
                inner: InMemoryStore::new(),
            }),
            2,
        );
        assert!(mgr.ensure_collection("otr").await);
    }

    #[tokio::test]
    async fn delete_then_list() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = manager(store, 2);
        mgr.ensure_collection("otr").await;
        assert!(mgr.delete_collection("otr").await);
        assert!(mgr.list_collections().await.is_empty());
        assert!(!mgr.delete_collection("otr").await);
    }
}
