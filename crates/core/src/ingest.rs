use crate::{
    chunk_document, ChunkingOptions, DocumentChunk, DocumentFingerprint, IngestError, PageText,
    PdfExtractor,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub fingerprint: DocumentFingerprint,
    pub chunks: Vec<DocumentChunk>,
}

pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprints a PDF and pulls the text of all of its pages.
pub fn extract_document<E>(
    path: &Path,
    extractor: &E,
) -> Result<(DocumentFingerprint, Vec<PageText>), IngestError>
where
    E: PdfExtractor + ?Sized,
{
    if !is_pdf_path(path) {
        return Err(IngestError::InvalidArgument(format!(
            "not a pdf file: {}",
            path.display()
        )));
    }

    let mut fingerprint = build_document_fingerprint(path)?;
    let pages = extractor.extract_pages(path)?;
    fingerprint.page_count = pages.len() as u32;

    Ok((fingerprint, pages))
}

/// Extracts and chunks one PDF.
pub fn load_document<E>(
    path: &Path,
    extractor: &E,
    options: ChunkingOptions,
) -> Result<LoadedDocument, IngestError>
where
    E: PdfExtractor + ?Sized,
{
    options.validate()?;

    let (fingerprint, pages) = extract_document(path, extractor)?;
    let chunks = chunk_document(&pages, options)?;
    info!(
        file = %fingerprint.file_name,
        pages = fingerprint.page_count,
        chunk_count = chunks.len(),
        "document chunked"
    );

    Ok(LoadedDocument {
        fingerprint,
        chunks,
    })
}

fn build_document_fingerprint(path: &Path) -> Result<DocumentFingerprint, IngestError> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(DocumentFingerprint {
        document_id: checksum.clone(),
        file_name: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        page_count: 0,
        loaded_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct FixedPages(Vec<PageText>);

    impl PdfExtractor for FixedPages {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(self.0.clone())
        }
    }

    fn write_pdf(dir: &Path, name: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, b"%PDF-1.4\n%fake")?;
        Ok(path)
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn loaded_document_is_fingerprinted_and_chunked() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = write_pdf(dir.path(), "Report.PDF")?;
        let extractor = FixedPages(vec![
            PageText {
                number: 1,
                text: "x".repeat(1000),
            },
            PageText {
                number: 2,
                text: "short page".to_string(),
            },
        ]);

        let loaded = load_document(&path, &extractor, ChunkingOptions::default())?;

        assert_eq!(loaded.fingerprint.file_name, "Report.PDF");
        assert_eq!(loaded.fingerprint.page_count, 2);
        assert_eq!(loaded.fingerprint.checksum, digest_file(&path)?);
        let ids: Vec<&str> = loaded.chunks.iter().map(|chunk| chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["p1-c0", "p1-c1", "p2-c0"]);
        Ok(())
    }

    #[test]
    fn non_pdf_files_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"plain text")?;

        let result = load_document(&path, &FixedPages(Vec::new()), ChunkingOptions::default());
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn invalid_options_fail_before_reading() {
        let options = ChunkingOptions {
            chunk_size: 800,
            overlap: 800,
        };
        let result = load_document(Path::new("missing.pdf"), &FixedPages(Vec::new()), options);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_document(
            Path::new("/definitely/not/here.pdf"),
            &FixedPages(Vec::new()),
            ChunkingOptions::default(),
        );
        assert!(matches!(result, Err(IngestError::Io(_))));
    }
}
