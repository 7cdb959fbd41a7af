//! # Remediation Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` turns a learner's question context (prompt, keywords, domain) into a short list
//! of citations to read after an answer is revealed. It sits on top of the embedding layer
//! (`semantic`) and the vector layer (`index`) and owns everything that is specific to
//! remediation: keyword extraction, the payload-to-citation field policies, the local
//! practice corpus and the fallback cascade.
//!
//! ## The cascade
//!
//! [`RemediationPipeline::resolve`] tries its sources strictly in order and returns the first
//! non-empty answer:
//!
//! 1. **Fixture**: when [`PipelineConfig::fixture`] is set, one canned item, before anything else.
//! 2. **Input check**: without keywords (explicit or derived from the prompt) and without a
//!    domain there is nothing to search for, so the answer is empty and no call is made.
//! 3. **Reference corpus**: prompt and keywords are embedded together and searched in the
//!    reference collection (`nbcot_sources` by default) with a 0.3 similarity floor.
//! 4. **Question bank**: when configured, a filtered search over a template collection.
//! 5. **Local keywords**: [`rank`] over the practice sets loaded into the [`Corpus`].
//!
//! A failing stage is logged with `tracing::warn!` and treated as empty. `resolve` has no
//! error path, so the HTTP layer can always answer `200`.
//!
//! ## Core Types
//!
//! - [`RemediationRequest`] / [`RemediationResponse`] / [`RemediationItem`]: the wire types.
//! - [`PipelineConfig`]: limits, reference collection and threshold, fixture toggle.
//! - [`ReferenceSearch`] and [`QuestionBankSearch`]: the two vector-backed seams, implemented
//!   by [`VectorReferenceSearch`] and [`VectorQuestionBank`].
//! - [`ItemPolicy`] / [`FieldPolicy`]: which payload keys feed title, excerpt and source.
//! - [`RemediationMetrics`]: optional per-stage observer.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use matcher::{Corpus, PipelineConfig, RemediationPipeline, RemediationRequest};
//!
//! let corpus = Corpus::from_json_str(r#"[{
//!     "id": "otr-baseline",
//!     "title": "OTR Baseline Practice Test",
//!     "status": "available",
//!     "questions": [
//!         { "id": "q1", "headline": "Hand splinting", "content": "A resting hand splint keeps the wrist in extension." }
//!     ]
//! }]"#).expect("corpus");
//!
//! let pipeline = RemediationPipeline::new(PipelineConfig::default(), Arc::new(corpus))
//!     .expect("valid config");
//!
//! # tokio_test::block_on(async {
//! let response = pipeline
//!     .resolve(&RemediationRequest {
//!         prompt: Some("Which splint positions the wrist?".into()),
//!         ..Default::default()
//!     })
//!     .await;
//! assert_eq!(response.items[0].id, "q1");
//! assert_eq!(response.items[0].source.as_deref(), Some("OTR Baseline Practice Test"));
//! # });
//! ```

mod corpus;
mod keywords;
mod metrics;
mod pipeline;
mod policy;
mod ranker;
mod sources;
mod types;

pub use crate::corpus::{BookAnswer, Corpus, CorpusEntry, PracticeQuestion, PracticeSet, SetStatus};
pub use crate::keywords::{
    derive_keywords, sanitize_keywords, search_keywords, MAX_KEYWORDS, MIN_DERIVED_KEYWORD_LEN,
};
pub use crate::metrics::{set_remediation_metrics, RemediationMetrics, StageOutcome};
pub use crate::pipeline::{
    fixture_items, RemediationPipeline, Stage, FIXTURE_EXCERPT, FIXTURE_ID, FIXTURE_SOURCE,
    FIXTURE_TITLE,
};
pub use crate::policy::{
    truncate_chars, FieldAccessor, FieldPolicy, ItemPolicy, REFERENCE_EXCERPT_CHARS,
    STEM_EXCERPT_CHARS, STEM_TITLE_CHARS,
};
pub use crate::ranker::{rank, CONTENT_EXCERPT_CHARS};
pub use crate::sources::{QuestionBankSearch, ReferenceSearch, VectorQuestionBank, VectorReferenceSearch};
pub use crate::types::{
    MatchError, PipelineConfig, RemediationItem, RemediationRequest, RemediationResponse,
};
