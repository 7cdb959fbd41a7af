//! Workspace umbrella crate for exam-prep remediation.
//!
//! Re-exports the member crates so callers can depend on one package:
//!
//! - [`semantic`]: embedding providers (hosted API, local ONNX model, stub)
//! - [`index`]: vector store backends, the collection manager and the search client
//! - [`matcher`]: practice corpus, keyword ranking and the remediation cascade
//! - [`server`]: the axum service and the `populate` tooling
//!
//! The most common entry points are also re-exported at the top level.

pub use index;
pub use matcher;
pub use semantic;
pub use server;

pub use index::{
    BackendConfig, CollectionManager, ExamAnalysis, QuestionMetadata, QuestionVector,
    SearchClient, SearchFilters, SearchHit, TemplateMetadata, VectorStore,
};
pub use matcher::{
    Corpus, PipelineConfig, RemediationItem, RemediationPipeline, RemediationRequest,
    RemediationResponse, rank,
};
pub use semantic::{Embedder, Embedding, EmbeddingMode, SemanticConfig};
pub use server::{ServerConfig, build_router, start_server};
