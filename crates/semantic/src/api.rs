use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::time::Duration;

use crate::{embedding_dimension, Embedding, EmbeddingProvider, SemanticConfig, SemanticError};

// Shared pool; per-request timeouts come from the provider config.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// OpenAI-compatible `/v1/embeddings` client.
#[derive(Debug, Clone)]
pub struct HostedProvider {
    url: String,
    api_key: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl HostedProvider {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            url: url.into(),
            api_key: api_key.into(),
            dimension: embedding_dimension(&model),
            model,
            timeout: Duration::from_secs(30),
        }
    }

    /// Builds the provider from config. Returns `None` when no credential is configured.
    pub fn from_config(cfg: &SemanticConfig) -> Option<Self> {
        let key = cfg.api_key()?;
        Some(
            Self::new(cfg.api_url.clone(), key, cfg.model_name.clone())
                .with_timeout(Duration::from_secs(cfg.api_timeout_secs.max(1))),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send(&self, payload: Value) -> Result<Value, SemanticError> {
        let response = HTTP_CLIENT
            .post(&self.url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SemanticError::Download(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SemanticError::Download(format!(
                "HTTP error {status}: {body}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SemanticError::Inference(format!("Invalid JSON response: {e}")))
    }
}

#[async_trait]
impl EmbeddingProvider for HostedProvider {
    fn name(&self) -> &str {
        "hosted"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding, SemanticError> {
        let payload = json!({ "model": self.model, "input": text });
        let response = self.send(payload).await?;
        let vector = parse_embeddings_from_value(response)?
            .into_iter()
            .next()
            .ok_or_else(|| SemanticError::Inference("response carried no embeddings".into()))?;

        if vector.len() != self.dimension {
            return Err(SemanticError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        Ok(Embedding {
            vector,
            model_name: self.model.clone(),
            provider: "hosted".into(),
        })
    }
}

/// Accepts `{ "data": [{ "embedding": [...] }] }` as well as the bare `{ "embeddings": ... }`
/// shape some compatible gateways return.
fn parse_embeddings_from_value(value: Value) -> Result<Vec<Vec<f32>>, SemanticError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_embedding_collection(embeddings);
            }

            if let Some(Value::Array(items)) = map.remove("data") {
                return items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(mut obj) => obj
                            .remove("embedding")
                            .ok_or_else(|| {
                                SemanticError::Inference(
                                    "missing `embedding` field in data item".into(),
                                )
                            })
                            .and_then(parse_embedding_vector),
                        _ => Err(SemanticError::Inference(
                            "unexpected entry inside `data` array".into(),
                        )),
                    })
                    .collect();
            }

            Err(SemanticError::Inference(
                "unsupported API response shape".into(),
            ))
        }
        other => parse_embedding_collection(other),
    }
}

fn parse_embedding_collection(value: Value) -> Result<Vec<Vec<f32>>, SemanticError> {
    match value {
        Value::Array(items) if items.iter().all(|item| matches!(item, Value::Array(_))) => {
            items.into_iter().map(parse_embedding_vector).collect()
        }
        other => parse_embedding_vector(other).map(|vec| vec![vec]),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, SemanticError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| {
                entry.as_f64().map(|f| f as f32).ok_or_else(|| {
                    SemanticError::Inference("embedding entries must be numbers".into())
                })
            })
            .collect(),
        _ => Err(SemanticError::Inference(
            "embedding must be an array of numbers".into(),
        )),
    }
}
