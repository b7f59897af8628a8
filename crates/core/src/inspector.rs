//! Browsing helpers over a loaded chunk set: quick entity tags, chunk
//! filtering, and per-page chunk counts.

use crate::{DocumentChunk, IngestError};
use regex::Regex;
use std::collections::BTreeMap;

/// Only the head of the document is scanned for tags.
pub const ENTITY_SCAN_CHUNKS: usize = 50;
pub const MAX_ENTITY_TAGS: usize = 6;

const YEAR_PATTERN: &str = r"\b(?:19|20)\d{2}\b";
const PERCENT_PATTERN: &str = r"\b\d+(?:\.\d+)?%";
const ORGANISATION_PATTERN: &str = r"\b[A-Z][a-z]+ (?:Inc|Corp|LLC|Ltd|Group)\b";

/// Distinct years, percentages and company names, in first-seen order.
pub fn extract_entities(chunks: &[DocumentChunk]) -> Result<Vec<String>, IngestError> {
    let patterns = [
        Regex::new(YEAR_PATTERN)?,
        Regex::new(PERCENT_PATTERN)?,
        Regex::new(ORGANISATION_PATTERN)?,
    ];

    let mut tags: Vec<String> = Vec::new();
    for chunk in chunks.iter().take(ENTITY_SCAN_CHUNKS) {
        for pattern in &patterns {
            for found in pattern.find_iter(&chunk.text) {
                if !tags.iter().any(|tag| tag == found.as_str()) {
                    tags.push(found.as_str().to_string());
                }
            }
        }
    }

    tags.truncate(MAX_ENTITY_TAGS);
    Ok(tags)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SearchFilter {
    None,
    Page(u32),
    Text(String),
}

fn parse_search_term(search_term: &str) -> SearchFilter {
    let term = search_term.trim().to_lowercase();
    if term.is_empty() {
        return SearchFilter::None;
    }

    if let Some(rest) = term.strip_prefix('p') {
        let digits: String = rest
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if let Ok(page) = digits.parse::<u32>() {
            return SearchFilter::Page(page);
        }
    }

    SearchFilter::Text(term)
}

/// Narrows `chunks` by a search box term and a set of active tags.
///
/// A term such as `p4` selects page 4; any other term is a case-insensitive
/// substring match. Tags match case-sensitively and any one tag suffices.
pub fn filter_chunks<'a>(
    chunks: &'a [DocumentChunk],
    search_term: &str,
    active_tags: &[String],
) -> Vec<&'a DocumentChunk> {
    let filter = parse_search_term(search_term);

    chunks
        .iter()
        .filter(|chunk| match &filter {
            SearchFilter::None => true,
            SearchFilter::Page(page) => chunk.page_number == *page,
            SearchFilter::Text(term) => chunk.text.to_lowercase().contains(term.as_str()),
        })
        .filter(|chunk| {
            active_tags.is_empty() || active_tags.iter().any(|tag| chunk.text.contains(tag.as_str()))
        })
        .collect()
}

/// Chunk count per page, ascending by page number.
pub fn page_heatmap(chunks: &[DocumentChunk]) -> Vec<(u32, usize)> {
    let mut pages = BTreeMap::<u32, usize>::new();
    for chunk in chunks {
        *pages.entry(chunk.page_number).or_default() += 1;
    }
    pages.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkMetadata;

    fn chunk(page_number: u32, chunk_index: u32, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: DocumentChunk::make_id(page_number, chunk_index),
            text: text.to_string(),
            page_number,
            metadata: ChunkMetadata {
                chunk_index,
                total_chunks: 0,
            },
        }
    }

    #[test]
    fn entities_are_distinct_and_capped() {
        let chunks = vec![
            chunk(1, 0, "In 2023 Acme Corp grew 12.5% and in 2024 it grew 8%."),
            chunk(2, 0, "Globex Group matched the 2023 figure; 1850 is too old."),
            chunk(3, 0, "Initech Inc posted 3% in 1999."),
        ];

        let tags = extract_entities(&chunks).expect("patterns compile");
        assert_eq!(
            tags,
            vec!["2023", "2024", "12.5%", "8%", "Acme Corp", "Globex Group"]
        );
    }

    #[test]
    fn entity_scan_stops_after_the_first_chunks() {
        let mut chunks: Vec<DocumentChunk> = (0..ENTITY_SCAN_CHUNKS as u32)
            .map(|index| chunk(1, index, "no tags here"))
            .collect();
        chunks.push(chunk(2, 0, "2019"));

        assert!(extract_entities(&chunks).expect("patterns compile").is_empty());
    }

    #[test]
    fn page_term_filters_by_page() {
        let chunks = vec![chunk(1, 0, "alpha"), chunk(12, 0, "beta"), chunk(12, 1, "gamma")];

        let ids: Vec<&str> = filter_chunks(&chunks, " P12 ", &[])
            .into_iter()
            .map(|chunk| chunk.id.as_str())
            .collect();
        assert_eq!(ids, vec!["p12-c0", "p12-c1"]);
    }

    #[test]
    fn other_terms_match_text_case_insensitively() {
        let chunks = vec![chunk(1, 0, "Pressure rating"), chunk(2, 0, "flow rate")];

        let found = filter_chunks(&chunks, "PRESSURE", &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].page_number, 1);

        assert_eq!(filter_chunks(&chunks, "", &[]).len(), 2);
    }

    #[test]
    fn any_active_tag_is_enough() {
        let chunks = vec![
            chunk(1, 0, "Revenue in 2024"),
            chunk(1, 1, "Margin of 8%"),
            chunk(2, 0, "nothing"),
        ];
        let tags = vec!["2024".to_string(), "8%".to_string()];

        assert_eq!(filter_chunks(&chunks, "", &tags).len(), 2);
        assert_eq!(filter_chunks(&chunks, "margin", &tags).len(), 1);
        assert!(filter_chunks(&chunks, "p2", &tags).is_empty());
    }

    #[test]
    fn heatmap_counts_chunks_per_page() {
        let chunks = vec![chunk(3, 0, "a"), chunk(1, 0, "b"), chunk(3, 1, "c")];
        assert_eq!(page_heatmap(&chunks), vec![(1, 1), (3, 2)]);
    }
}
