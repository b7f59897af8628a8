pub mod chunking;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod inspector;
pub mod models;
pub mod ranking;
pub mod session;
pub mod traits;

pub use chunking::{chunk_document, chunk_page};
pub use error::{GenerationError, IngestError, SessionError};
pub use extractor::{ExtractionConfig, LopdfExtractor, PageText, PdfExtractor, RemoteEngineConfig};
pub use generation::{render_context, GeminiGenerator, GeneratorConfig};
pub use ingest::{digest_file, extract_document, load_document, LoadedDocument};
pub use inspector::{extract_entities, filter_chunks, page_heatmap};
pub use models::{
    ChatMessage, ChatRole, ChunkMetadata, ChunkingOptions, DocumentChunk, DocumentFingerprint,
    HistoryTurn, ProcessingState, ProcessingStatus, ScoredChunk, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, DEFAULT_TOP_K,
};
pub use ranking::{query_terms, rank, rank_scored, KeywordRanker};
pub use session::ChatSession;
pub use traits::{AnswerGenerator, ChunkRanker};
