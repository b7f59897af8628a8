use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{ChunkMetadata, ChunkingOptions, DocumentChunk};
use std::collections::HashSet;

impl ChunkingOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }

        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Cuts one page into fixed-size character windows.
///
/// Windows advance by `chunk_size - overlap` characters and ignore word and
/// sentence boundaries. The last window of a page may be shorter than
/// `chunk_size`. An empty page yields no chunks.
pub fn chunk_page(
    page_number: u32,
    page_text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<DocumentChunk>, IngestError> {
    let options = ChunkingOptions {
        chunk_size,
        overlap,
    };
    options.validate()?;

    let windows = char_windows(page_text, options);
    let total_chunks = windows.len() as u32;

    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let chunk_index = index as u32;
            DocumentChunk {
                id: DocumentChunk::make_id(page_number, chunk_index),
                text: text.to_string(),
                page_number,
                metadata: ChunkMetadata {
                    chunk_index,
                    total_chunks,
                },
            }
        })
        .collect())
}

/// Chunks every page in order and concatenates the results.
///
/// Page numbers must be 1-based and distinct so chunk ids stay unique.
pub fn chunk_document(
    pages: &[PageText],
    options: ChunkingOptions,
) -> Result<Vec<DocumentChunk>, IngestError> {
    options.validate()?;

    let mut seen = HashSet::new();
    let mut chunks = Vec::new();
    for page in pages {
        if page.number == 0 {
            return Err(IngestError::InvalidArgument(
                "page numbers start at 1".to_string(),
            ));
        }
        if !seen.insert(page.number) {
            return Err(IngestError::InvalidArgument(format!(
                "page {} appears more than once",
                page.number
            )));
        }

        chunks.extend(chunk_page(
            page.number,
            &page.text,
            options.chunk_size,
            options.overlap,
        )?);
    }

    Ok(chunks)
}

fn char_windows(text: &str, options: ChunkingOptions) -> Vec<&str> {
    // byte offset of every char start, plus the end of the text
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    let mut windows = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + options.chunk_size).min(char_count);
        windows.push(&text[bounds[start]..bounds[end]]);
        if end == char_count {
            break;
        }
        start += options.stride();
    }

    windows
}
