//! Embedding provider adapter
//!
//! This crate turns question text into vectors for the remediation service. Callers only see
//! [`Embedder::embed`]; behind it sit a couple of providers tried in order:
//!
//! - **Hosted** - OpenAI-compatible `/v1/embeddings` API (`text-embedding-3-small` by default,
//!   1536 dimensions). Skipped entirely when no API key is configured.
//! - **Local** - all-MiniLM-L6-v2 through ONNX Runtime (384 dimensions). Loaded lazily, once per
//!   process, on a dedicated worker thread, then kept resident.
//! - **Stub** - deterministic hashing vectors. Only used when asked for explicitly (demos,
//!   tests); it is never a silent fallback.
//!
//! A hosted failure (network, non-2xx, bad JSON, wrong dimension) is logged and swallowed; the
//! caller only gets [`SemanticError::EmbeddingUnavailable`] when every provider failed.
//!
//! Note that the hosted and local models produce vectors of different widths. A vector from the
//! fallback can only be searched against a collection built with the same model.
//!
//! ## Quick example
//!
//! ```no_run
//! use semantic::{Embedder, SemanticConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cfg = SemanticConfig {
//!         api_key: std::env::var("OPENAI_API_KEY").ok(),
//!         ..Default::default()
//!     };
//!     let embedder = Embedder::from_config(&cfg).unwrap();
//!     let embedding = embedder.embed("Which splint for a boutonniere deformity?").await.unwrap();
//!     println!("{} dims from {}", embedding.dimension(), embedding.provider);
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

mod api;
mod assets;
mod local;
mod normalize;
mod onnx;
mod stub;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;

pub use crate::api::HostedProvider;
pub use crate::config::{EmbeddingMode, SemanticConfig};
pub use crate::error::SemanticError;
pub use crate::local::LocalProvider;
pub use crate::stub::StubProvider;
pub use crate::types::Embedding;

pub const DEFAULT_HOSTED_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_LOCAL_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Something that can turn one piece of text into a vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short label used in logs and on [`Embedding::provider`].
    fn name(&self) -> &str;
    /// Width of the vectors this provider returns.
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Embedding, SemanticError>;
}

/// Known output widths. Unknown hosted model names get the default model's width.
pub fn embedding_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        "all-MiniLM-L6-v2" | "Xenova/all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            384
        }
        _ => 1536,
    }
}

/// Composite text indexed for a question: domain, stem, options and rationale separated by
/// blank lines. Options and rationale are only included when present.
pub fn question_embedding_text<S: AsRef<str>>(
    stem: &str,
    variants: &[S],
    rationale: Option<&str>,
    domain: &str,
) -> String {
    let mut parts = vec![format!("Domain: {domain}"), format!("Question: {stem}")];

    if !variants.is_empty() {
        let options: Vec<&str> = variants.iter().map(AsRef::as_ref).collect();
        parts.push(format!("Options: {}", options.join(" | ")));
    }

    if let Some(rationale) = rationale.filter(|r| !r.is_empty()) {
        parts.push(format!("Rationale: {rationale}"));
    }

    parts.join("\n\n")
}

/// Primary provider with an optional fallback.
#[derive(Clone)]
pub struct Embedder {
    primary: Option<Arc<dyn EmbeddingProvider>>,
    fallback: Option<Arc<dyn EmbeddingProvider>>,
    batch_concurrency: usize,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_string()))
            .field("fallback", &self.fallback.as_ref().map(|p| p.name().to_string()))
            .field("batch_concurrency", &self.batch_concurrency)
            .finish()
    }
}

impl Embedder {
    pub fn new(
        primary: Option<Arc<dyn EmbeddingProvider>>,
        fallback: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            primary,
            fallback,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    pub fn with_batch_concurrency(mut self, n: usize) -> Self {
        self.batch_concurrency = n.max(1);
        self
    }

    /// Wires providers according to [`SemanticConfig::mode`].
    ///
    /// `auto` with no API key yields a local-only embedder; `hosted` without a key is a
    /// configuration error.
    pub fn from_config(cfg: &SemanticConfig) -> Result<Self, SemanticError> {
        let hosted = || {
            HostedProvider::from_config(cfg).map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>)
        };
        let local = || Arc::new(LocalProvider::new(cfg.clone())) as Arc<dyn EmbeddingProvider>;

        let embedder = match cfg.mode {
            EmbeddingMode::Auto => Self::new(hosted(), Some(local())),
            EmbeddingMode::Hosted => {
                let primary = hosted().ok_or_else(|| {
                    SemanticError::InvalidConfig("hosted mode requires an api key".into())
                })?;
                Self::new(Some(primary), None)
            }
            EmbeddingMode::Local => Self::new(Some(local()), None),
            EmbeddingMode::Stub => Self::new(
                Some(Arc::new(StubProvider::new(cfg.stub_dimension)) as Arc<dyn EmbeddingProvider>),
                None,
            ),
        };
        Ok(embedder.with_batch_concurrency(cfg.batch_concurrency))
    }

    /// Local model only, or the stub in `stub` mode. The hosted provider is never used, so
    /// vectors always have the local model's width.
    ///
    /// Collections built from MiniLM chunks (the reference corpus) must be queried through this
    /// embedder.
    pub fn local_from_config(cfg: &SemanticConfig) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = match cfg.mode {
            EmbeddingMode::Stub => Arc::new(StubProvider::new(cfg.stub_dimension)),
            _ => Arc::new(LocalProvider::new(cfg.clone())),
        };
        Self::new(Some(provider), None).with_batch_concurrency(cfg.batch_concurrency)
    }

    /// Width of vectors from the first configured provider.
    pub fn dimension(&self) -> Option<usize> {
        self.primary
            .as_ref()
            .or(self.fallback.as_ref())
            .map(|p| p.dimension())
    }

    /// Names of the configured providers, in the order they are tried.
    pub fn providers(&self) -> Vec<&str> {
        self.primary
            .iter()
            .chain(self.fallback.iter())
            .map(|p| p.name())
            .collect()
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding, SemanticError> {
        let mut failures = Vec::new();

        if let Some(primary) = &self.primary {
            match primary.embed(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(err) => {
                    tracing::warn!(provider = primary.name(), error = %err, "embedding provider failed");
                    failures.push(format!("{}: {err}", primary.name()));
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            match fallback.embed(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(err) => {
                    tracing::warn!(provider = fallback.name(), error = %err, "fallback embedding provider failed");
                    failures.push(format!("{}: {err}", fallback.name()));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no embedding provider configured".into());
        }
        Err(SemanticError::EmbeddingUnavailable(failures.join("; ")))
    }

    /// Embeds every text with at most `max_concurrency` requests in flight. The output has the
    /// same order as `texts`; the first failure fails the whole batch.
    pub async fn embed_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        max_concurrency: usize,
    ) -> Result<Vec<Embedding>, SemanticError> {
        stream::iter(texts.iter().map(|text| self.embed(text.as_ref())))
            .buffered(max_concurrency.max(1))
            .try_collect()
            .await
    }

    /// [`embed_batch`](Self::embed_batch) with the configured concurrency.
    pub async fn embed_all<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Embedding>, SemanticError> {
        self.embed_batch(texts, self.batch_concurrency).await
    }
}
