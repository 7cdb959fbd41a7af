use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which providers the [`Embedder`](crate::Embedder) is allowed to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// Hosted API first (when a key is configured), local model as the fallback.
    #[default]
    Auto,
    /// Hosted API only.
    Hosted,
    /// Local ONNX model only.
    Local,
    /// Deterministic hashing stub. Never chosen implicitly.
    Stub,
}

/// Runtime configuration for the embedding providers.
///
/// # Example
/// ```no_run
/// use semantic::{Embedder, EmbeddingMode, SemanticConfig};
///
/// let cfg = SemanticConfig {
///     mode: EmbeddingMode::Auto,
///     api_key: Some("sk-...".into()),
///     ..Default::default()
/// }
/// .with_model_dir("./models/all-MiniLM-L6-v2");
///
/// let embedder = Embedder::from_config(&cfg).unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemanticConfig {
    pub mode: EmbeddingMode,
    /// Hosted model name, sent verbatim in the request body.
    pub model_name: String,
    /// OpenAI-compatible embeddings endpoint.
    pub api_url: String,
    /// Bearer credential. `None` skips the hosted provider entirely.
    pub api_key: Option<String>,
    /// Per-request timeout for the hosted provider, in seconds.
    pub api_timeout_secs: u64,
    /// Label reported for vectors produced by the local model.
    pub local_model_name: String,
    /// Where the ONNX file lives (also the download target when
    /// [`model_url`](Self::model_url) is set).
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    /// Path to `tokenizer.json`; defaults to a file next to the model.
    pub tokenizer_path: Option<PathBuf>,
    pub tokenizer_url: Option<String>,
    /// Token budget per input for the local model.
    pub max_sequence_length: usize,
    /// Upper bound on in-flight requests for [`Embedder::embed_batch`](crate::Embedder::embed_batch).
    pub batch_concurrency: usize,
    /// Output dimension of the stub provider.
    pub stub_dimension: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Auto,
            model_name: crate::DEFAULT_HOSTED_MODEL.into(),
            api_url: "https://api.openai.com/v1/embeddings".into(),
            api_key: None,
            api_timeout_secs: 30,
            local_model_name: crate::DEFAULT_LOCAL_MODEL.into(),
            model_path: PathBuf::from("./models/all-MiniLM-L6-v2/onnx/model.onnx"),
            model_url: None,
            tokenizer_path: Some(PathBuf::from("./models/all-MiniLM-L6-v2/tokenizer.json")),
            tokenizer_url: None,
            max_sequence_length: 256,
            batch_concurrency: crate::DEFAULT_BATCH_CONCURRENCY,
            stub_dimension: 384,
        }
    }
}

impl SemanticConfig {
    /// Points the local provider at a model directory laid out like a Hugging Face export
    /// (`tokenizer.json` plus `onnx/model.onnx` or `model.onnx`).
    pub fn with_model_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let nested = dir.join("onnx").join("model.onnx");
        self.model_path = if nested.exists() || !dir.join("model.onnx").exists() {
            nested
        } else {
            dir.join("model.onnx")
        };
        self.tokenizer_path = Some(dir.join("tokenizer.json"));
        self
    }

    /// The hosted credential, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_the_small_hosted_model() {
        let cfg = SemanticConfig::default();
        assert_eq!(cfg.mode, EmbeddingMode::Auto);
        assert_eq!(cfg.model_name, "text-embedding-3-small");
        assert_eq!(cfg.local_model_name, "all-MiniLM-L6-v2");
        assert_eq!(cfg.api_timeout_secs, 30);
        assert_eq!(cfg.batch_concurrency, 5);
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let cfg = SemanticConfig {
            api_key: Some("   ".into()),
            ..Default::default()
        };
        assert!(cfg.api_key().is_none());

        let cfg = SemanticConfig {
            api_key: Some(" sk-test ".into()),
            ..Default::default()
        };
        assert_eq!(cfg.api_key(), Some("sk-test"));
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let cfg: SemanticConfig =
            serde_json::from_str(r#"{ "mode": "stub", "stub_dimension": 8 }"#).unwrap();
        assert_eq!(cfg.mode, EmbeddingMode::Stub);
        assert_eq!(cfg.stub_dimension, 8);
        assert_eq!(cfg.model_name, "text-embedding-3-small");
    }

    #[test]
    fn model_dir_prefers_nested_onnx_layout() {
        let cfg = SemanticConfig::default().with_model_dir("/nonexistent/minilm");
        assert_eq!(
            cfg.model_path,
            PathBuf::from("/nonexistent/minilm/onnx/model.onnx")
        );
        assert_eq!(
            cfg.tokenizer_path,
            Some(PathBuf::from("/nonexistent/minilm/tokenizer.json"))
        );
    }
}
