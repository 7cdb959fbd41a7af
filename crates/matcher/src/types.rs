use index::IndexError;
use semantic::SemanticError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// A learner's question context, as posted by the practice-test UI.
///
/// Every field is optional. Fields of the wrong JSON type are treated as absent rather than
/// rejecting the whole request, and non-string entries inside `keywords` are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemediationRequest {
    /// Question being remediated; excluded from question-bank and local results.
    #[serde(default, deserialize_with = "lenient_string")]
    pub question_id: Option<String>,
    /// Explicit search terms. When empty, terms are derived from `prompt`.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub prompt: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub domain: Option<String>,
    /// Requested item count. Clamped by [`PipelineConfig::clamp_limit`].
    #[serde(default, deserialize_with = "lenient_number")]
    pub limit: Option<f64>,
    /// Practice set that scopes the local keyword fallback.
    #[serde(default, deserialize_with = "lenient_string")]
    pub test_id: Option<String>,
}

impl RemediationRequest {
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                JsonValue::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(JsonValue::deserialize(deserializer)?.as_f64())
}

/// One citation shown to the learner after an answer is revealed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemediationItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Wire shape of a remediation answer: `{ "items": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemediationResponse {
    pub items: Vec<RemediationItem>,
}

impl RemediationResponse {
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<Vec<RemediationItem>> for RemediationResponse {
    fn from(items: Vec<RemediationItem>) -> Self {
        Self { items }
    }
}

/// Tunables for [`RemediationPipeline`](crate::RemediationPipeline).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Answer every request with the canned fixture item. Intended for demos and UI tests.
    #[serde(default)]
    pub fixture: bool,
    /// Item count used when the request has no positive limit.
    #[serde(default = "PipelineConfig::default_limit")]
    pub default_limit: usize,
    /// Upper bound applied to any requested limit.
    #[serde(default = "PipelineConfig::default_max_limit")]
    pub max_limit: usize,
    /// Collection holding the source textbook and outline chunks.
    #[serde(default = "PipelineConfig::default_reference_collection")]
    pub reference_collection: String,
    /// Minimum cosine similarity for a reference chunk to count as a hit.
    #[serde(default = "PipelineConfig::default_reference_score_threshold")]
    pub reference_score_threshold: f32,
    /// Exam template whose question collection backs the question-bank stage.
    #[serde(default = "PipelineConfig::default_question_bank_template")]
    pub question_bank_template: String,
}

impl PipelineConfig {
    pub(crate) fn default_limit() -> usize {
        3
    }

    pub(crate) fn default_max_limit() -> usize {
        5
    }

    pub(crate) fn default_reference_collection() -> String {
        index::DEFAULT_REFERENCE_COLLECTION.to_string()
    }

    pub(crate) fn default_reference_score_threshold() -> f32 {
        0.3
    }

    pub(crate) fn default_question_bank_template() -> String {
        "nbcot-otr".to_string()
    }

    /// `limit > 0` is capped at `max_limit`; anything else (absent, zero, negative, NaN) falls
    /// back to `default_limit`. Fractional limits round down but never below one.
    pub fn clamp_limit(&self, requested: Option<f64>) -> usize {
        match requested {
            Some(limit) if limit > 0.0 => (limit.floor() as usize).clamp(1, self.max_limit),
            _ => self.default_limit,
        }
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.max_limit == 0 {
            return Err(MatchError::InvalidConfig(
                "max_limit must be greater than zero".into(),
            ));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(MatchError::InvalidConfig(
                "default_limit must be between 1 and max_limit".into(),
            ));
        }
        if self.reference_collection.trim().is_empty() {
            return Err(MatchError::InvalidConfig(
                "reference_collection must not be empty".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.reference_score_threshold) {
            return Err(MatchError::InvalidConfig(
                "reference_score_threshold must be between -1.0 and 1.0".into(),
            ));
        }
        if self.question_bank_template.trim().is_empty() {
            return Err(MatchError::InvalidConfig(
                "question_bank_template must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fixture: false,
            default_limit: Self::default_limit(),
            max_limit: Self::default_max_limit(),
            reference_collection: Self::default_reference_collection(),
            reference_score_threshold: Self::default_reference_score_threshold(),
            question_bank_template: Self::default_question_bank_template(),
        }
    }
}

/// Errors produced by the remediation layer.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Invalid pipeline configuration.
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
    /// The practice-set corpus could not be read or parsed.
    #[error("corpus error: {0}")]
    Corpus(String),
    /// A pipeline stage produced something unusable.
    #[error("pipeline error: {0}")]
    Pipeline(String),
    /// Embedding the query failed on every provider.
    #[error("semantic error: {0}")]
    Semantic(#[from] SemanticError),
    /// Vector search failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config_is_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(!cfg.fixture);
        assert_eq!(cfg.reference_collection, "nbcot_sources");
        assert_eq!(cfg.reference_score_threshold, 0.3);
    }

    #[test]
    fn limit_is_clamped_to_max_and_defaults_otherwise() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.clamp_limit(Some(100.0)), 5);
        assert_eq!(cfg.clamp_limit(Some(5.0)), 5);
        assert_eq!(cfg.clamp_limit(Some(2.0)), 2);
        assert_eq!(cfg.clamp_limit(Some(0.0)), 3);
        assert_eq!(cfg.clamp_limit(Some(-4.0)), 3);
        assert_eq!(cfg.clamp_limit(Some(f64::NAN)), 3);
        assert_eq!(cfg.clamp_limit(Some(0.5)), 1);
        assert_eq!(cfg.clamp_limit(None), 3);
    }

    #[test]
    fn default_limit_above_max_rejected() {
        let cfg = PipelineConfig {
            default_limit: 6,
            ..PipelineConfig::default()
        };
        let err = cfg.validate().expect_err("config should be invalid");
        match err {
            MatchError::InvalidConfig(msg) => assert!(msg.contains("default_limit")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let cfg = PipelineConfig {
            reference_score_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn request_tolerates_wrong_field_types() {
        let request: RemediationRequest = serde_json::from_value(json!({
            "questionId": 42,
            "keywords": ["Splint", 7, null, "tenodesis"],
            "prompt": "Hand therapy",
            "limit": "four",
            "domain": ["not", "a", "string"],
            "testId": "otr-baseline"
        }))
        .unwrap();
        assert_eq!(request.question_id, None);
        assert_eq!(request.keywords, vec!["Splint", "tenodesis"]);
        assert_eq!(request.prompt.as_deref(), Some("Hand therapy"));
        assert_eq!(request.limit, None);
        assert_eq!(request.domain, None);
        assert_eq!(request.test_id.as_deref(), Some("otr-baseline"));
    }

    #[test]
    fn empty_object_is_an_empty_request() {
        let request: RemediationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, RemediationRequest::default());
    }

    #[test]
    fn optional_item_fields_are_omitted() {
        let item = RemediationItem {
            id: "q1".into(),
            title: None,
            excerpt: "text".into(),
            source: None,
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({ "id": "q1", "excerpt": "text" })
        );
    }
}
