use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::MatchError;

/// Textbook citation attached to a practice question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookAnswer {
    pub title: String,
    pub excerpt: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// One question of a practice set, as shipped with the application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PracticeQuestion {
    pub id: String,
    pub headline: String,
    #[serde(default)]
    pub subheadline: Option<String>,
    /// Rationale text shown after the answer is revealed.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub book_answer: Option<BookAnswer>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SetStatus {
    Available,
    InProgress,
    ComingSoon,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PracticeSet {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: SetStatus,
    #[serde(default)]
    pub questions: Vec<PracticeQuestion>,
}

/// A question together with the set it came from.
#[derive(Debug, Clone, Copy)]
pub struct CorpusEntry<'a> {
    pub set_id: &'a str,
    pub set_title: &'a str,
    pub question: &'a PracticeQuestion,
}

/// All practice sets known to the service, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    sets: Vec<PracticeSet>,
}

impl Corpus {
    pub fn new(sets: Vec<PracticeSet>) -> Self {
        Self { sets }
    }

    /// Parses a JSON array of practice sets.
    pub fn from_json_str(json: &str) -> Result<Self, MatchError> {
        serde_json::from_str(json)
            .map(Self::new)
            .map_err(|e| MatchError::Corpus(e.to_string()))
    }

    /// Reads and parses a corpus file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, MatchError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MatchError::Corpus(format!("{}: {e}", path.display())))?;
        let corpus = Self::from_json_str(&json)?;
        tracing::info!(
            path = %path.display(),
            sets = corpus.sets.len(),
            questions = corpus.question_count(),
            "practice corpus loaded"
        );
        Ok(corpus)
    }

    pub fn sets(&self) -> &[PracticeSet] {
        &self.sets
    }

    pub fn set(&self, id: &str) -> Option<&PracticeSet> {
        self.sets.iter().find(|set| set.id == id)
    }

    pub fn question_count(&self) -> usize {
        self.sets.iter().map(|set| set.questions.len()).sum()
    }

    /// Questions of every `available` set, concatenated in declaration order.
    pub fn available(&self) -> Vec<CorpusEntry<'_>> {
        self.sets
            .iter()
            .filter(|set| set.status == SetStatus::Available)
            .flat_map(entries)
            .collect()
    }

    /// Candidate pool for the keyword fallback: the named set when it has questions
    /// (whatever its status), otherwise the available corpus.
    pub fn pool(&self, test_id: Option<&str>) -> Vec<CorpusEntry<'_>> {
        match test_id.and_then(|id| self.set(id)) {
            Some(set) if !set.questions.is_empty() => entries(set).collect(),
            _ => self.available(),
        }
    }
}

fn entries(set: &PracticeSet) -> impl Iterator<Item = CorpusEntry<'_>> {
    set.questions.iter().map(move |question| CorpusEntry {
        set_id: &set.id,
        set_title: &set.title,
        question,
    })
}
