use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::corpus::Corpus;
use crate::keywords::search_keywords;
use crate::metrics::{metrics_recorder, RemediationMetrics, StageOutcome};
use crate::policy::ItemPolicy;
use crate::ranker::rank;
use crate::sources::{QuestionBankSearch, ReferenceSearch};
use crate::types::{
    MatchError, PipelineConfig, RemediationItem, RemediationRequest, RemediationResponse,
};

#[cfg(test)]
mod tests;

pub const FIXTURE_ID: &str = "mock-vector-result";
pub const FIXTURE_TITLE: &str = "MiniLM Reference";
pub const FIXTURE_EXCERPT: &str = "Example rationale excerpt for the selected NBCOT topic demonstrating how book anchors surface after reveal.";
pub const FIXTURE_SOURCE: &str = "Case-Smith & O'Brien";

/// Cascade stages, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fixture,
    Reference,
    QuestionBank,
    LocalKeyword,
}

impl Stage {
    /// Stages after the fixture check and input validation.
    pub const CASCADE: [Stage; 3] = [Stage::Reference, Stage::QuestionBank, Stage::LocalKeyword];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fixture => "fixture",
            Stage::Reference => "reference",
            Stage::QuestionBank => "question_bank",
            Stage::LocalKeyword => "local_keyword",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitized view of a request shared by every stage.
#[derive(Debug, Clone, PartialEq)]
struct Query {
    question_id: Option<String>,
    prompt: Option<String>,
    keywords: Vec<String>,
    domain: Option<String>,
    test_id: Option<String>,
    limit: usize,
}

impl Query {
    fn from_request(request: &RemediationRequest, limit: usize) -> Self {
        let trimmed = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let prompt = request
            .prompt
            .clone()
            .filter(|p| !p.trim().is_empty());
        Self {
            question_id: trimmed(&request.question_id),
            keywords: search_keywords(&request.keywords, prompt.as_deref()),
            prompt,
            domain: trimmed(&request.domain),
            test_id: trimmed(&request.test_id),
            limit,
        }
    }

    /// Prompt followed by the keywords, space separated.
    fn text(&self) -> String {
        self.prompt
            .iter()
            .chain(self.keywords.iter())
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// Resolves remediation citations for a practice question.
///
/// Sources are tried in a fixed order and the first non-empty answer wins:
///
/// 1. the canned fixture, when enabled;
/// 2. the reference corpus, by embedding similarity;
/// 3. the question bank, when configured;
/// 4. keyword overlap against the local practice corpus.
///
/// Nothing is ever returned as an error: a failing stage is logged and the next one runs.
pub struct RemediationPipeline {
    config: PipelineConfig,
    corpus: Arc<Corpus>,
    reference: Option<Arc<dyn ReferenceSearch>>,
    question_bank: Option<Arc<dyn QuestionBankSearch>>,
    metrics: Option<Arc<dyn RemediationMetrics>>,
}

impl RemediationPipeline {
    pub fn new(config: PipelineConfig, corpus: Arc<Corpus>) -> Result<Self, MatchError> {
        config.validate()?;
        Ok(Self {
            config,
            corpus,
            reference: None,
            question_bank: None,
            metrics: None,
        })
    }

    pub fn with_reference(mut self, reference: Arc<dyn ReferenceSearch>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Enables the question-bank stage. Leave unset when no vector endpoint is configured.
    pub fn with_question_bank(mut self, question_bank: Arc<dyn QuestionBankSearch>) -> Self {
        self.question_bank = Some(question_bank);
        self
    }

    /// Report to this observer instead of the global one.
    pub fn with_metrics(mut self, metrics: Arc<dyn RemediationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Stages that would run for a request, for readiness reporting.
    pub fn enabled_stages(&self) -> Vec<Stage> {
        if self.config.fixture {
            return vec![Stage::Fixture];
        }
        Stage::CASCADE
            .into_iter()
            .filter(|stage| match stage {
                Stage::Reference => self.reference.is_some(),
                Stage::QuestionBank => self.question_bank.is_some(),
                _ => true,
            })
            .collect()
    }

    pub async fn resolve(&self, request: &RemediationRequest) -> RemediationResponse {
        let limit = self.config.clamp_limit(request.limit);

        if self.config.fixture {
            let started = Instant::now();
            let items = fixture_items(request.question_id.as_deref(), limit);
            self.record(Stage::Fixture, started, StageOutcome::Hit(items.len()));
            return items.into();
        }

        let query = Query::from_request(request, limit);
        if query.keywords.is_empty() && query.domain.is_none() {
            tracing::debug!("remediation request has no keywords or domain");
            return RemediationResponse::empty();
        }

        for stage in Stage::CASCADE {
            let started = Instant::now();
            let result = match self.attempt(stage, &query).await {
                Some(result) => result,
                None => continue,
            };
            match result {
                Ok(items) if !items.is_empty() => {
                    tracing::debug!(stage = %stage, items = items.len(), "remediation resolved");
                    self.record(stage, started, StageOutcome::Hit(items.len()));
                    return items.into();
                }
                Ok(_) => {
                    tracing::debug!(stage = %stage, "remediation stage empty");
                    self.record(stage, started, StageOutcome::Empty);
                }
                Err(err) => {
                    tracing::warn!(stage = %stage, error = %err, "remediation stage failed");
                    self.record(stage, started, StageOutcome::Failed);
                }
            }
        }

        RemediationResponse::empty()
    }

    /// Runs one stage. `None` means the stage does not apply to this request or is not
    /// configured.
    async fn attempt(
        &self,
        stage: Stage,
        query: &Query,
    ) -> Option<Result<Vec<RemediationItem>, MatchError>> {
        match stage {
            Stage::Fixture => None,
            Stage::Reference => {
                let reference = self.reference.as_ref()?;
                let text = query.text();
                if text.is_empty() {
                    return None;
                }
                Some(reference.search(&text, query.limit).await.map(|hits| {
                    let policy = ItemPolicy::reference();
                    hits.into_iter()
                        .take(query.limit)
                        .map(|hit| policy.apply(hit.id, &hit.metadata))
                        .collect()
                }))
            }
            Stage::QuestionBank => {
                let bank = self.question_bank.as_ref()?;
                Some(
                    bank.search(
                        &query.keywords,
                        query.domain.as_deref(),
                        query.question_id.as_deref(),
                        query.limit,
                    )
                    .await
                    .map(|hits| {
                        let policy = ItemPolicy::question_bank();
                        hits.into_iter()
                            .take(query.limit)
                            .map(|hit| policy.apply(hit.id, &hit.metadata))
                            .collect()
                    }),
                )
            }
            Stage::LocalKeyword => {
                if query.keywords.is_empty() {
                    return None;
                }
                let pool = self.corpus.pool(query.test_id.as_deref());
                Some(Ok(rank(
                    &pool,
                    &query.keywords,
                    query.limit,
                    query.question_id.as_deref(),
                )))
            }
        }
    }

    fn record(&self, stage: Stage, started: Instant, outcome: StageOutcome) {
        let recorder = self.metrics.clone().or_else(metrics_recorder);
        if let Some(recorder) = recorder {
            recorder.record_stage(stage, started.elapsed(), outcome);
        }
    }
}

/// The canned item returned while the fixture is enabled, cut to `limit`.
pub fn fixture_items(question_id: Option<&str>, limit: usize) -> Vec<RemediationItem> {
    vec![RemediationItem {
        id: question_id.unwrap_or(FIXTURE_ID).to_string(),
        title: Some(FIXTURE_TITLE.to_string()),
        excerpt: FIXTURE_EXCERPT.to_string(),
        source: Some(FIXTURE_SOURCE.to_string()),
    }]
    .into_iter()
    .take(limit)
    .collect()
}
