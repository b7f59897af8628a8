use crate::{DocumentChunk, GenerationError, HistoryTurn, ScoredChunk};
use async_trait::async_trait;

pub trait ChunkRanker {
    fn rank_scored(&self, query: &str, chunks: &[DocumentChunk]) -> Vec<ScoredChunk>;

    fn rank(&self, query: &str, chunks: &[DocumentChunk]) -> Vec<DocumentChunk> {
        self.rank_scored(query, chunks)
            .into_iter()
            .map(|item| item.chunk)
            .collect()
    }
}

#[async_trait]
pub trait AnswerGenerator {
    async fn generate(
        &self,
        query: &str,
        context_chunks: &[DocumentChunk],
        history: &[HistoryTurn],
    ) -> Result<String, GenerationError>;
}
