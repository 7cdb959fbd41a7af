//! Search-term extraction for remediation requests.

use std::collections::HashSet;

/// Upper bound on search terms, explicit or derived.
pub const MAX_KEYWORDS: usize = 8;
/// Derived terms shorter than this are dropped.
pub const MIN_DERIVED_KEYWORD_LEN: usize = 4;

/// Normalizes caller-supplied keywords: trimmed, lowercased, blanks dropped, at most
/// [`MAX_KEYWORDS`] kept. Order and duplicates are preserved.
pub fn sanitize_keywords<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    keywords
        .iter()
        .map(|keyword| keyword.as_ref().trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .take(MAX_KEYWORDS)
        .collect()
}

/// Derives search terms from free text.
///
/// The prompt is lowercased, every character outside `[a-z0-9]` and whitespace becomes a
/// space, and the result is split on whitespace. Tokens shorter than
/// [`MIN_DERIVED_KEYWORD_LEN`] are dropped, the first [`MAX_KEYWORDS`] survivors are taken
/// and duplicates removed keeping first occurrence.
///
/// ```
/// use matcher::derive_keywords;
///
/// let terms = derive_keywords("Evaluate proximal stability and postural control");
/// assert_eq!(terms, vec!["evaluate", "proximal", "stability", "postural", "control"]);
/// ```
pub fn derive_keywords(prompt: &str) -> Vec<String> {
    let cleaned: String = prompt
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut seen = HashSet::new();
    cleaned
        .split_whitespace()
        .filter(|token| token.len() >= MIN_DERIVED_KEYWORD_LEN)
        .take(MAX_KEYWORDS)
        .filter(|token| seen.insert(*token))
        .map(str::to_string)
        .collect()
}

/// Explicit keywords win; the prompt is only mined when none survive sanitation.
pub fn search_keywords<S: AsRef<str>>(explicit: &[S], prompt: Option<&str>) -> Vec<String> {
    let keywords = sanitize_keywords(explicit);
    if !keywords.is_empty() {
        return keywords;
    }
    prompt.map(derive_keywords).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_keeps_long_tokens_in_order() {
        let terms = derive_keywords("Evaluate proximal stability and postural control");
        for expected in ["evaluate", "proximal", "stability", "postural", "control"] {
            assert!(terms.contains(&expected.to_string()), "missing {expected}");
        }
        assert!(terms.iter().all(|t| t.len() >= 4));
        assert!(!terms.contains(&"and".to_string()));
    }

    #[test]
    fn derivation_removes_duplicates() {
        let terms = derive_keywords("Splint splint SPLINT, splint! wrist-splint");
        assert_eq!(terms, vec!["splint", "wrist"]);
    }

    #[test]
    fn punctuation_splits_tokens() {
        let terms = derive_keywords("C6 tenodesis/grasp: (patient's) ROM");
        assert_eq!(terms, vec!["tenodesis", "grasp", "patient"]);
    }

    #[test]
    fn only_first_eight_tokens_are_considered() {
        let prompt = "alpha bravo charlie delta echoo foxtrot golff hotel india juliet";
        let terms = derive_keywords(prompt);
        assert_eq!(terms.len(), MAX_KEYWORDS);
        assert_eq!(terms.last().map(String::as_str), Some("hotel"));
    }

    #[test]
    fn non_ascii_letters_become_separators() {
        assert_eq!(derive_keywords("café dysphagia"), vec!["dysphagia"]);
    }

    #[test]
    fn explicit_keywords_are_sanitized() {
        let keywords = sanitize_keywords(&["  Splint ", "", "   ", "ROM", "a", "b", "c", "d", "e", "f", "g"]);
        assert_eq!(keywords, vec!["splint", "rom", "a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn prompt_is_used_only_without_explicit_keywords() {
        assert_eq!(
            search_keywords(&["Grip"], Some("Evaluate posture")),
            vec!["grip"]
        );
        assert_eq!(
            search_keywords::<&str>(&[], Some("Evaluate posture")),
            vec!["evaluate", "posture"]
        );
        assert_eq!(search_keywords(&["  "], Some("Evaluate")), vec!["evaluate"]);
        assert!(search_keywords::<&str>(&[], None).is_empty());
    }
}
