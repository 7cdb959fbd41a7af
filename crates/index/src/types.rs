use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload attached to a stored point: a flat JSON object.
pub type Payload = Map<String, Value>;

/// Vector metric. Only cosine is used for question collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

/// Shape of a collection at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub dimension: usize,
    pub distance: Distance,
    pub segment_number: u64,
    pub replication_factor: u32,
}

impl CollectionSpec {
    pub fn cosine(dimension: usize) -> Self {
        Self {
            dimension,
            distance: Distance::Cosine,
            segment_number: crate::DEFAULT_SEGMENT_NUMBER,
            replication_factor: crate::DEFAULT_REPLICATION_FACTOR,
        }
    }
}

/// A vector plus payload, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A point returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// Backend point id (may be a derived UUID; see [`SearchHit`](crate::SearchHit) for the
    /// caller-facing id).
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// What a payload field must equal.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    Keyword(String),
    Integer(i64),
    /// Matches when the field equals any of the listed keywords.
    AnyKeyword(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub key: String,
    pub matches: MatchValue,
}

impl FieldCondition {
    pub fn keyword(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            matches: MatchValue::Keyword(value.into()),
        }
    }

    pub fn integer(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            matches: MatchValue::Integer(value),
        }
    }

    pub fn any_keyword(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            matches: MatchValue::AnyKeyword(values),
        }
    }

    /// Evaluates the condition against a payload. Array fields match when any element does.
    pub fn matches_payload(&self, payload: &Payload) -> bool {
        match payload.get(&self.key) {
            Some(Value::Array(items)) => items.iter().any(|item| self.matches_value(item)),
            Some(value) => self.matches_value(value),
            None => false,
        }
    }

    fn matches_value(&self, value: &Value) -> bool {
        match (&self.matches, value) {
            (MatchValue::Keyword(expected), Value::String(actual)) => expected == actual,
            (MatchValue::AnyKeyword(expected), Value::String(actual)) => {
                expected.iter().any(|candidate| candidate == actual)
            }
            (MatchValue::Integer(expected), Value::Number(actual)) => {
                actual.as_i64() == Some(*expected)
                    || actual.as_f64() == Some(*expected as f64)
            }
            _ => false,
        }
    }
}

/// Boolean payload filter: every `must` condition holds and no `must_not` condition does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

impl PayloadFilter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    pub fn matches(&self, payload: &Payload) -> bool {
        self.must.iter().all(|c| c.matches_payload(payload))
            && !self.must_not.iter().any(|c| c.matches_payload(payload))
    }
}

/// Backend-level similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub limit: u64,
    pub filter: Option<PayloadFilter>,
    /// Results scoring below this are dropped by the backend.
    pub score_threshold: Option<f32>,
}
