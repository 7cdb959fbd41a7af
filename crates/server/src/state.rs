use crate::config::ServerConfig;
use crate::error::ServerResult;
use dashmap::DashMap;
use index::{CollectionManager, SearchClient, VectorStore};
use matcher::{Corpus, RemediationPipeline, VectorQuestionBank, VectorReferenceSearch};
use metrics_exporter_prometheus::PrometheusHandle;
use semantic::{embedding_dimension, Embedder};
use std::sync::Arc;

/// Stage-two search over the reference collection.
///
/// Chunks are stored as MiniLM vectors, so queries go through the local model whatever the
/// hosted configuration is. The client refuses query vectors that do not match the stored width.
pub fn reference_search(config: &ServerConfig, store: Arc<dyn VectorStore>) -> VectorReferenceSearch {
    let embedder = Embedder::local_from_config(&config.semantic);
    let dimension = config
        .reference
        .dimension
        .or_else(|| embedder.dimension())
        .unwrap_or_else(|| embedding_dimension(&config.semantic.local_model_name));
    VectorReferenceSearch::new(
        Arc::new(embedder),
        SearchClient::new(store).with_dimension(dimension),
        &config.pipeline,
    )
}

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: API key -> (count, window_start)
    pub rate_limiter: Arc<DashMap<String, (u32, std::time::Instant)>>,

    /// Remediation cascade (shared across requests)
    pub pipeline: Arc<RemediationPipeline>,

    /// Per-template collections on the primary vector backend
    pub collections: CollectionManager,

    /// Embedder used by the pipeline and the populate tooling
    pub embedder: Arc<Embedder>,

    /// Renders `/metrics`; `None` when metrics are disabled
    pub prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    /// Wire embedder, vector backends, corpus and pipeline from configuration.
    ///
    /// Stages whose backend is not configured are left out of the pipeline rather than
    /// failing at request time.
    pub async fn build(
        config: ServerConfig,
        prometheus: Option<PrometheusHandle>,
    ) -> ServerResult<Self> {
        let embedder = Arc::new(Embedder::from_config(&config.semantic)?);
        let dimension = embedder
            .dimension()
            .unwrap_or_else(|| embedding_dimension(&config.semantic.model_name));

        let primary_backend = config.vector.backend();
        let store = primary_backend.build()?;
        let collections = CollectionManager::new(store.clone(), dimension);

        let corpus = match &config.corpus_path {
            Some(path) => Corpus::load(path).await?,
            None => {
                tracing::warn!("No practice corpus configured; keyword fallback has nothing to rank");
                Corpus::default()
            }
        };

        let mut pipeline = RemediationPipeline::new(config.pipeline.clone(), Arc::new(corpus))?;

        if let Some(backend) = config.reference_backend() {
            let reference_store: Arc<dyn VectorStore> = if backend == primary_backend {
                store.clone()
            } else {
                backend.build()?
            };
            pipeline = pipeline.with_reference(Arc::new(reference_search(&config, reference_store)));
        }

        if let Some(backend) = config.question_bank_backend() {
            let client = SearchClient::new(backend.build()?).with_dimension(dimension);
            pipeline = pipeline.with_question_bank(Arc::new(VectorQuestionBank::new(
                embedder.clone(),
                client,
                config.pipeline.question_bank_template.clone(),
            )));
        }

        tracing::info!(
            providers = ?embedder.providers(),
            dimension,
            stages = ?pipeline.enabled_stages(),
            "remediation pipeline ready"
        );

        Ok(Self::from_parts(
            config,
            pipeline,
            collections,
            embedder,
            prometheus,
        ))
    }

    /// Assemble state from already-built components.
    pub fn from_parts(
        config: ServerConfig,
        pipeline: RemediationPipeline,
        collections: CollectionManager,
        embedder: Arc<Embedder>,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            pipeline: Arc::new(pipeline),
            collections,
            embedder,
            prometheus,
        }
    }

    /// Authentication is required only once at least one key is configured.
    pub fn auth_required(&self) -> bool {
        !self.config.api_keys.is_empty()
    }

    /// Check if API key is valid
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.config.api_keys.contains(key)
    }

    /// Check rate limit for API key
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = std::time::Instant::now();
        let window = std::time::Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }
}
