use crate::models::{DocumentChunk, ScoredChunk, DEFAULT_TOP_K};
use crate::traits::ChunkRanker;

const MIN_TERM_CHARS: usize = 4;
const FIRST_HIT_WEIGHT: f64 = 1.0;
const REPEAT_HIT_WEIGHT: f64 = 0.1;

/// Lower-cased query terms, split on runs of characters outside
/// `[A-Za-z0-9_]`.
///
/// Terms of three characters or fewer are dropped as a cheap stop-word
/// filter.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .filter(|term| term.chars().count() >= MIN_TERM_CHARS)
        .map(str::to_string)
        .collect()
}

pub fn score_text(text: &str, terms: &[String]) -> f64 {
    let lowered = text.to_lowercase();
    terms
        .iter()
        .map(|term| match lowered.matches(term.as_str()).count() {
            0 => 0.0,
            occurrences => FIRST_HIT_WEIGHT + REPEAT_HIT_WEIGHT * (occurrences - 1) as f64,
        })
        .sum()
}

/// Scores every chunk against `query` and keeps the `top_k` best with a
/// positive score. Equal scores keep their input order.
pub fn rank_scored(query: &str, chunks: &[DocumentChunk], top_k: usize) -> Vec<ScoredChunk> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .map(|chunk| ScoredChunk {
            chunk: chunk.clone(),
            score: score_text(&chunk.text, &terms),
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|left, right| right.score.total_cmp(&left.score));

    scored
        .into_iter()
        .filter(|item| item.score > 0.0)
        .take(top_k)
        .collect()
}

pub fn rank(query: &str, chunks: &[DocumentChunk], top_k: usize) -> Vec<DocumentChunk> {
    rank_scored(query, chunks, top_k)
        .into_iter()
        .map(|item| item.chunk)
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct KeywordRanker {
    pub top_k: usize,
}

impl Default for KeywordRanker {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl ChunkRanker for KeywordRanker {
    fn rank_scored(&self, query: &str, chunks: &[DocumentChunk]) -> Vec<ScoredChunk> {
        rank_scored(query, chunks, self.top_k)
    }
}
