use async_trait::async_trait;
use index::{SearchClient, SearchFilters, SearchHit};
use semantic::Embedder;
use std::sync::Arc;

use crate::types::{MatchError, PipelineConfig};

/// Semantic search over the reference corpus (textbook and outline chunks).
#[async_trait]
pub trait ReferenceSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MatchError>;
}

/// Semantic search over indexed question records.
#[async_trait]
pub trait QuestionBankSearch: Send + Sync {
    async fn search(
        &self,
        keywords: &[String],
        domain: Option<&str>,
        exclude_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MatchError>;
}

/// [`ReferenceSearch`] that embeds the query and asks the vector store, keeping only hits at or
/// above the configured score threshold.
pub struct VectorReferenceSearch {
    embedder: Arc<Embedder>,
    client: SearchClient,
    collection: String,
    score_threshold: f32,
}

impl VectorReferenceSearch {
    pub fn new(embedder: Arc<Embedder>, client: SearchClient, config: &PipelineConfig) -> Self {
        Self {
            embedder,
            client,
            collection: config.reference_collection.clone(),
            score_threshold: config.reference_score_threshold,
        }
    }
}

#[async_trait]
impl ReferenceSearch for VectorReferenceSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MatchError> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self
            .client
            .search_collection(
                &self.collection,
                embedding.into_vector(),
                limit,
                Some(self.score_threshold),
            )
            .await?;
        Ok(hits)
    }
}

/// [`QuestionBankSearch`] over one template collection, filtered by domain and excluding the
/// question being remediated.
pub struct VectorQuestionBank {
    embedder: Arc<Embedder>,
    client: SearchClient,
    template_id: String,
}

impl VectorQuestionBank {
    pub fn new(embedder: Arc<Embedder>, client: SearchClient, template_id: impl Into<String>) -> Self {
        Self {
            embedder,
            client,
            template_id: template_id.into(),
        }
    }
}

#[async_trait]
impl QuestionBankSearch for VectorQuestionBank {
    async fn search(
        &self,
        keywords: &[String],
        domain: Option<&str>,
        exclude_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MatchError> {
        // With only a domain to go on, the domain label itself is the query.
        let query = if keywords.is_empty() {
            domain.unwrap_or_default().to_string()
        } else {
            keywords.join(" ")
        };
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(&query).await?;
        let filters = SearchFilters {
            domain: domain.map(str::to_string),
            difficulty: None,
            exclude_ids: exclude_id.map(str::to_string).into_iter().collect(),
        };
        Ok(self
            .client
            .search(&self.template_id, embedding.into_vector(), limit, Some(&filters))
            .await)
    }
}
