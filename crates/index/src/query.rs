use std::cmp::Ordering;

use crate::types::{Payload, PayloadFilter, ScoredRecord, VectorQuery};

/// Chunk size for the auto-vectorized inner loops.
const SIMD_CHUNK_SIZE: usize = 32;

/// Cosine similarity of two equally sized vectors. Mismatched or zero vectors score 0.
#[inline]
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0f32;
    let mut norm_a = 0f32;
    let mut norm_b = 0f32;

    for (ca, cb) in a.chunks(SIMD_CHUNK_SIZE).zip(b.chunks(SIMD_CHUNK_SIZE)) {
        for (x, y) in ca.iter().zip(cb) {
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Brute-force scoring used by the in-memory store: filter, score, threshold, sort by score
/// descending, truncate.
pub(crate) fn rank_points<'a, I>(points: I, query: &VectorQuery) -> Vec<ScoredRecord>
where
    I: IntoIterator<Item = (&'a String, &'a Vec<f32>, &'a Payload)>,
{
    let filter = query.filter.as_ref().filter(|f| !f.is_empty());
    let mut scored: Vec<ScoredRecord> = points
        .into_iter()
        .filter(|(_, _, payload)| filter.is_none_or(|f: &PayloadFilter| f.matches(payload)))
        .map(|(id, vector, payload)| ScoredRecord {
            id: id.clone(),
            score: cosine_similarity(&query.vector, vector),
            payload: payload.clone(),
        })
        .filter(|hit| query.score_threshold.is_none_or(|t| hit.score >= t))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(query.limit as usize);
    scored
}
