use index::BackendConfig;
use matcher::PipelineConfig;
use semantic::SemanticConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Rate limit on admin routes: requests per minute per API key
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Keys accepted on the admin routes. Empty leaves them open.
    #[serde(default)]
    pub api_keys: HashSet<String>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// JSON file with the practice sets used by the keyword fallback
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,

    /// Embedding providers
    #[serde(default)]
    pub semantic: SemanticConfig,

    /// Vector backend holding the per-template collections
    #[serde(default)]
    pub vector: VectorConfig,

    /// Reference-corpus backend, when it differs from `vector`
    #[serde(default)]
    pub reference: ReferenceConfig,

    /// Question-bank backend; the stage is skipped unless both url and key are set
    #[serde(default)]
    pub question_bank: QuestionBankConfig,

    /// Cascade limits, reference collection, fixture toggle
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VectorConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_vector_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: default_vector_timeout_secs(),
        }
    }
}

impl VectorConfig {
    /// Qdrant when a url is configured, otherwise a process-local store.
    pub fn backend(&self) -> BackendConfig {
        match non_blank(&self.url) {
            Some(url) => BackendConfig::Qdrant {
                url,
                api_key: non_blank(&self.api_key),
                timeout_secs: self.timeout_secs,
            },
            None => BackendConfig::InMemory,
        }
    }

    pub fn is_configured(&self) -> bool {
        non_blank(&self.url).is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ReferenceConfig {
    /// Overrides `vector.url` for the reference collection.
    #[serde(default)]
    pub url: Option<String>,
    /// Width of the stored chunk vectors. Defaults to the local model's width.
    #[serde(default)]
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct QuestionBankConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `remediation` config file, `REMEDIATION__*`
    /// variables, and finally the well-known deployment variables.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("remediation").required(false))
            // Override with environment variables
            .add_source(
                config::Environment::with_prefix("REMEDIATION")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("api_keys")
                    .try_parsing(true),
            );

        let mut config: ServerConfig = builder.build()?.try_deserialize()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.pipeline.validate()?;

        Ok(config)
    }

    /// Applies the variable names used by existing deployments. Blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(fixture) = get("NBCOT_VECTOR_FIXTURE") {
            self.pipeline.fixture = fixture.trim().eq_ignore_ascii_case("mock");
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.semantic.api_key = Some(key);
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.semantic.model_name = model;
        }
        if let Some(dir) = get("REMEDIATION_LOCAL_MODEL_DIR") {
            self.semantic = self.semantic.clone().with_model_dir(dir);
        }
        if let Some(url) = get("QDRANT_URL") {
            self.vector.url = Some(url);
        }
        if let Some(key) = get("QDRANT_API_KEY") {
            self.vector.api_key = Some(key);
        }
        if let Some(collection) = get("NBCOT_SOURCES_COLLECTION") {
            self.pipeline.reference_collection = collection;
        }
        if let Some(url) = get("NBCOT_QDRANT_URL") {
            self.reference.url = Some(url);
        }
        if let Some(url) = get("VECTOR_STORE_API_URL") {
            self.question_bank.url = Some(url);
        }
        if let Some(key) = get("VECTOR_STORE_API_KEY") {
            self.question_bank.api_key = Some(key);
        }
        if let Some(path) = get("REMEDIATION_CORPUS_PATH") {
            self.corpus_path = Some(PathBuf::from(path));
        }
    }

    /// Backend for the reference collection, or `None` when neither `reference.url` nor
    /// `vector.url` is set.
    pub fn reference_backend(&self) -> Option<BackendConfig> {
        match non_blank(&self.reference.url) {
            Some(url) => Some(BackendConfig::Qdrant {
                url,
                api_key: non_blank(&self.vector.api_key),
                timeout_secs: self.vector.timeout_secs,
            }),
            None if self.vector.is_configured() => Some(self.vector.backend()),
            None => None,
        }
    }

    /// Backend for the question-bank stage; requires both endpoint and credential.
    pub fn question_bank_backend(&self) -> Option<BackendConfig> {
        let url = non_blank(&self.question_bank.url)?;
        let api_key = non_blank(&self.question_bank.api_key)?;
        Some(BackendConfig::Qdrant {
            url,
            api_key: Some(api_key),
            timeout_secs: self.vector.timeout_secs,
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            api_keys: HashSet::new(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            corpus_path: None,
            semantic: SemanticConfig::default(),
            vector: VectorConfig::default(),
            reference: ReferenceConfig::default(),
            question_bank: QuestionBankConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_vector_timeout_secs() -> u64 {
    10
}

fn default_max_body_size_mb() -> usize {
    1
}

fn default_rate_limit_per_minute() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
