use crate::ingest::extract_document;
use crate::traits::{AnswerGenerator, ChunkRanker};
use crate::{
    chunk_document, ChatMessage, ChatRole, ChunkingOptions, DocumentChunk, DocumentFingerprint,
    HistoryTurn, IngestError, KeywordRanker, PdfExtractor, ProcessingState, ProcessingStatus,
    SessionError,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Shown in place of an answer when the generator call fails.
pub const GENERATION_FAILURE_MESSAGE: &str =
    "Network interruption or API quota reached. Please retry.";

/// One user's conversation over one loaded PDF.
///
/// The session owns the chunk set and the message log. Chunks are handed out
/// as an immutable `Arc<[DocumentChunk]>` snapshot, so ranking never needs a
/// lock; loading a new document or calling [`ChatSession::reset`] replaces
/// the snapshot wholesale.
pub struct ChatSession<E, G, R = KeywordRanker> {
    extractor: E,
    generator: G,
    ranker: R,
    options: ChunkingOptions,
    state: ProcessingState,
    document: Option<DocumentFingerprint>,
    chunks: Arc<[DocumentChunk]>,
    messages: Vec<ChatMessage>,
    greeting_id: Option<String>,
}

impl<E, G> ChatSession<E, G, KeywordRanker>
where
    E: PdfExtractor,
    G: AnswerGenerator,
{
    pub fn new(extractor: E, generator: G, options: ChunkingOptions) -> Self {
        Self::with_ranker(extractor, generator, KeywordRanker::default(), options)
    }
}

impl<E, G, R> ChatSession<E, G, R>
where
    E: PdfExtractor,
    G: AnswerGenerator,
    R: ChunkRanker,
{
    pub fn with_ranker(extractor: E, generator: G, ranker: R, options: ChunkingOptions) -> Self {
        Self {
            extractor,
            generator,
            ranker,
            options,
            state: ProcessingState::default(),
            document: None,
            chunks: Arc::from(Vec::new()),
            messages: Vec::new(),
            greeting_id: None,
        }
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn document(&self) -> Option<&DocumentFingerprint> {
        self.document.as_ref()
    }

    pub fn chunks(&self) -> Arc<[DocumentChunk]> {
        Arc::clone(&self.chunks)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Resolves a cited source back to its chunk.
    pub fn chunk_by_id(&self, id: &str) -> Option<&DocumentChunk> {
        self.chunks.iter().find(|chunk| chunk.id == id)
    }

    /// Replaces the current document with the PDF at `path`.
    pub fn load(&mut self, path: &Path) -> Result<&DocumentFingerprint, SessionError> {
        self.clear();
        self.state = ProcessingState::new(ProcessingStatus::Parsing, 20, "Ingesting subject data...");
        info!(path = %path.display(), "loading document");

        let (fingerprint, chunks) = match self.extract_and_chunk(path) {
            Ok(loaded) => loaded,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "document ingestion failed");
                self.state = ProcessingState::new(ProcessingStatus::Error, 0, "Ingestion failure.");
                return Err(error.into());
            }
        };

        let greeting = ChatMessage::new(
            ChatRole::Assistant,
            format!(
                "Got it. I've finished mapping **{}**.\n\n\
                 I've indexed **{} chunks** across {} page(s). \
                 Ask me anything about it and I'll show you where the answer comes from.",
                fingerprint.file_name,
                chunks.len(),
                fingerprint.page_count
            ),
        );

        info!(
            file = %fingerprint.file_name,
            chunk_count = chunks.len(),
            "document ready"
        );

        self.greeting_id = Some(greeting.id.clone());
        self.messages.push(greeting);
        self.chunks = Arc::from(chunks);
        self.state = ProcessingState::new(ProcessingStatus::Ready, 100, "Synthesis engine active");
        let document: &DocumentFingerprint = self.document.insert(fingerprint);
        Ok(document)
    }

    /// Answers `query` from the loaded document and records both turns.
    ///
    /// Generator failures do not surface as errors: the session records a
    /// fallback assistant message with no sources and returns it.
    pub async fn ask(&mut self, query: &str) -> Result<ChatMessage, SessionError> {
        if self.state.status != ProcessingStatus::Ready {
            return Err(SessionError::NotReady(format!(
                "session status is {:?}",
                self.state.status
            )));
        }

        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::EmptyQuery);
        }

        let history = self.history();
        self.messages.push(ChatMessage::new(ChatRole::User, query));

        let chunks = self.chunks();
        let sources = self.ranker.rank(query, &chunks);
        info!(source_count = sources.len(), "ranked chunks for query");

        let reply = match self.generator.generate(query, &sources, &history).await {
            Ok(answer) => ChatMessage::new(ChatRole::Assistant, answer).with_sources(sources),
            Err(error) => {
                warn!(error = %error, "answer generation failed");
                ChatMessage::new(ChatRole::Assistant, GENERATION_FAILURE_MESSAGE)
            }
        };

        self.messages.push(reply.clone());
        Ok(reply)
    }

    /// Drops the document, its chunks and the conversation.
    pub fn reset(&mut self) {
        self.clear();
        self.state = ProcessingState::default();
    }

    fn extract_and_chunk(
        &mut self,
        path: &Path,
    ) -> Result<(DocumentFingerprint, Vec<DocumentChunk>), IngestError> {
        self.options.validate()?;
        let (fingerprint, pages) = extract_document(path, &self.extractor)?;

        self.state =
            ProcessingState::new(ProcessingStatus::Chunking, 60, "Splitting pages into chunks...");
        let chunks = chunk_document(&pages, self.options)?;

        Ok((fingerprint, chunks))
    }

    fn clear(&mut self) {
        self.document = None;
        self.chunks = Arc::from(Vec::new());
        self.messages.clear();
        self.greeting_id = None;
    }

    fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .filter(|message| Some(&message.id) != self.greeting_id.as_ref())
            .map(ChatMessage::to_turn)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenerationError, PageText};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    struct FakeExtractor {
        pages: Vec<PageText>,
    }

    impl PdfExtractor for FakeExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            if self.pages.is_empty() {
                return Err(IngestError::PdfParse("no pages".to_string()));
            }
            Ok(self.pages.clone())
        }
    }

    #[derive(Default)]
    struct FakeGenerator {
        fail: bool,
        calls: Mutex<Vec<(String, Vec<String>, Vec<HistoryTurn>)>>,
    }

    #[async_trait]
    impl AnswerGenerator for FakeGenerator {
        async fn generate(
            &self,
            query: &str,
            context_chunks: &[DocumentChunk],
            history: &[HistoryTurn],
        ) -> Result<String, GenerationError> {
            self.calls.lock().expect("calls lock").push((
                query.to_string(),
                context_chunks.iter().map(|chunk| chunk.id.clone()).collect(),
                history.to_vec(),
            ));

            if self.fail {
                return Err(GenerationError::Api {
                    status: 429,
                    body: "quota".to_string(),
                });
            }
            Ok(format!("answer to {query}"))
        }
    }

    fn pdf_fixture() -> (TempDir, std::path::PathBuf) {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("annual-report.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%fake").expect("write fixture");
        (dir, path)
    }

    fn report_pages() -> Vec<PageText> {
        vec![
            PageText {
                number: 1,
                text: "Revenue grew in 2024 while revenue per customer held steady.".to_string(),
            },
            PageText {
                number: 2,
                text: "Operating costs were flat.".to_string(),
            },
        ]
    }

    fn session(fail: bool) -> ChatSession<FakeExtractor, FakeGenerator> {
        ChatSession::new(
            FakeExtractor {
                pages: report_pages(),
            },
            FakeGenerator {
                fail,
                ..Default::default()
            },
            ChunkingOptions::default(),
        )
    }

    #[test]
    fn loading_a_document_makes_the_session_ready() {
        let (_dir, path) = pdf_fixture();
        let mut session = session(false);

        let fingerprint = session.load(&path).expect("load should succeed");
        assert_eq!(fingerprint.file_name, "annual-report.pdf");
        assert_eq!(session.state().status, ProcessingStatus::Ready);
        assert_eq!(session.state().progress, 100);
        assert_eq!(session.chunks().len(), 2);
        assert_eq!(session.messages().len(), 1);
        assert!(session.messages()[0].content.contains("annual-report.pdf"));
        assert_eq!(session.chunk_by_id("p2-c0").map(|chunk| chunk.page_number), Some(2));
    }

    #[test]
    fn failed_extraction_moves_to_error_state() {
        let (_dir, path) = pdf_fixture();
        let mut session = ChatSession::new(
            FakeExtractor { pages: Vec::new() },
            FakeGenerator::default(),
            ChunkingOptions::default(),
        );

        let result = session.load(&path);
        assert!(matches!(result, Err(SessionError::Ingest(IngestError::PdfParse(_)))));
        assert_eq!(session.state().status, ProcessingStatus::Error);
        assert!(session.chunks().is_empty());
    }

    #[tokio::test]
    async fn asking_before_loading_is_rejected() {
        let mut session = session(false);
        let result = session.ask("revenue").await;
        assert!(matches!(result, Err(SessionError::NotReady(_))));
    }

    #[tokio::test]
    async fn answers_carry_ranked_sources_and_history_skips_greeting() {
        let (_dir, path) = pdf_fixture();
        let mut session = session(false);
        session.load(&path).expect("load should succeed");

        let first = session.ask("How did revenue change?").await.expect("ask");
        assert_eq!(first.content, "answer to How did revenue change?");
        assert_eq!(first.sources.len(), 1);
        assert_eq!(first.sources[0].id, "p1-c0");

        session.ask("And costs?").await.expect("ask");
        assert_eq!(session.messages().len(), 5);

        let calls = session.generator.calls.lock().expect("calls lock");
        assert!(calls[0].2.is_empty());
        assert_eq!(calls[1].1, vec!["p2-c0".to_string()]);
        assert_eq!(
            calls[1].2,
            vec![
                HistoryTurn {
                    role: ChatRole::User,
                    content: "How did revenue change?".to_string(),
                },
                HistoryTurn {
                    role: ChatRole::Assistant,
                    content: "answer to How did revenue change?".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn generator_failure_records_fallback_message() {
        let (_dir, path) = pdf_fixture();
        let mut session = session(true);
        session.load(&path).expect("load should succeed");

        let reply = session.ask("revenue").await.expect("ask still returns a message");
        assert_eq!(reply.content, GENERATION_FAILURE_MESSAGE);
        assert!(reply.sources.is_empty());
        assert_eq!(session.messages().len(), 3);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let (_dir, path) = pdf_fixture();
        let mut session = session(false);
        session.load(&path).expect("load should succeed");

        let result = session.ask("   ").await;
        assert!(matches!(result, Err(SessionError::EmptyQuery)));
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn reset_discards_everything() {
        let (_dir, path) = pdf_fixture();
        let mut session = session(false);
        session.load(&path).expect("load should succeed");
        let snapshot = session.chunks();

        session.reset();
        assert_eq!(session.state(), &ProcessingState::default());
        assert!(session.chunks().is_empty());
        assert!(session.messages().is_empty());
        assert!(session.document().is_none());
        assert_eq!(snapshot.len(), 2);
    }
}
