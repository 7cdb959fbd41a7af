//! Remediation Server - HTTP API for practice-test remediation
//!
//! Exposes the [`matcher`] cascade to the practice-test UI and the vector collection
//! lifecycle to operators.
//!
//! # Features
//!
//! - **Remediation**: citations for a question after the answer is revealed, from the
//!   reference corpus, the question bank or the local keyword fallback
//! - **Collections**: list, analyze and drop per-template question collections
//! - **Health & Metrics**: liveness/readiness probes and a Prometheus endpoint
//! - **Authentication**: API keys with per-key rate limiting on the admin routes
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! ## Public
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe with the enabled cascade stages
//! - `GET /metrics` - Prometheus metrics
//! - `POST /api/remediation` - Resolve remediation items (always `200`)
//! - `GET /api/exams/metadata?templateId=` - Domains, types and difficulty levels of a template
//!
//! ## Admin (API key required when keys are configured)
//!
//! - `GET /api/v1/collections` - Template ids with a collection
//! - `DELETE /api/v1/collections/{template_id}` - Drop a template collection
//! - `GET /api/v1/collections/{template_id}/analysis` - Histograms over a template
//!
//! # Configuration
//!
//! [`ServerConfig::load`] layers `.env`, an optional `remediation.{toml,yaml,json}` file,
//! `REMEDIATION__*` variables and the deployment variables (`OPENAI_API_KEY`, `QDRANT_URL`,
//! `NBCOT_VECTOR_FIXTURE`, ...), in that order.

pub mod config;
pub mod error;
pub mod middleware;
pub mod populate;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, init_tracing, start_server};
pub use state::ServerState;
