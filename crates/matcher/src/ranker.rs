//! Keyword-overlap ranking over the local practice corpus.
//!
//! This is the last stage of the cascade and the only one with no I/O: given the same pool and
//! keywords it always returns the same items in the same order.

use crate::corpus::{CorpusEntry, PracticeQuestion};
use crate::policy::truncate_chars;
use crate::types::RemediationItem;

/// Characters of rationale used as the excerpt when a question has no book citation.
pub const CONTENT_EXCERPT_CHARS: usize = 320;

/// Scores every entry by how many keywords occur in it and returns the best `limit` items.
///
/// The haystack is the rationale, the book excerpt and title, the headline and the subheadline,
/// lowercased. Each keyword counts once when it occurs anywhere as a substring. Entries scoring
/// zero and the entry whose id equals `exclude_id` are dropped. Ties keep pool order.
pub fn rank<S: AsRef<str>>(
    pool: &[CorpusEntry<'_>],
    keywords: &[S],
    limit: usize,
    exclude_id: Option<&str>,
) -> Vec<RemediationItem> {
    if keywords.is_empty() || limit == 0 {
        return Vec::new();
    }
    let terms: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().to_lowercase())
        .collect();

    let mut scored: Vec<(usize, &CorpusEntry<'_>)> = pool
        .iter()
        .filter(|entry| Some(entry.question.id.as_str()) != exclude_id)
        .filter_map(|entry| {
            let haystack = haystack(entry.question);
            let score = terms
                .iter()
                .filter(|term| haystack.contains(term.as_str()))
                .count();
            (score > 0).then_some((score, entry))
        })
        .collect();

    // `sort_by` is stable, so equal scores stay in pool order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.truncate(limit);

    scored.into_iter().map(|(_, entry)| to_item(entry)).collect()
}

fn haystack(question: &PracticeQuestion) -> String {
    let book = question.book_answer.as_ref();
    [
        question.content.as_str(),
        book.map(|b| b.excerpt.as_str()).unwrap_or(""),
        book.map(|b| b.title.as_str()).unwrap_or(""),
        question.headline.as_str(),
        question.subheadline.as_deref().unwrap_or(""),
    ]
    .join(" ")
    .to_lowercase()
}

fn to_item(entry: &CorpusEntry<'_>) -> RemediationItem {
    let question = entry.question;
    match &question.book_answer {
        Some(book) => RemediationItem {
            id: question.id.clone(),
            title: Some(book.title.clone()),
            excerpt: book.excerpt.clone(),
            source: Some(
                book.source
                    .clone()
                    .unwrap_or_else(|| entry.set_title.to_string()),
            ),
        },
        None => RemediationItem {
            id: question.id.clone(),
            title: Some(question.headline.clone()),
            excerpt: truncate_chars(&question.content, CONTENT_EXCERPT_CHARS),
            source: Some(entry.set_title.to_string()),
        },
    }
}
