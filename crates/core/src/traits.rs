use crate::error::{ExtractionError, SearchError};
use crate::models::PaperChunk;
use async_trait::async_trait;

/// A nearest-neighbor match as the vector store returns it, before any
/// relevance scoring is applied.
#[derive(Debug, Clone)]
pub struct StoreMatch {
    pub chunk: PaperChunk,
    pub distance: f64,
}

#[async_trait]
pub trait VectorStore {
    /// Upserts chunks keyed by `chunk_id`. Re-sending a chunk with an
    /// existing id replaces it, which keeps ingestion re-runnable.
    async fn add(&self, chunks: &[PaperChunk]) -> Result<(), SearchError>;

    /// Returns up to `top_k` matches ordered by increasing distance.
    /// A small corpus may return fewer matches; that is not an error.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<StoreMatch>, SearchError>;

    async fn count(&self) -> Result<u64, SearchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, ExtractionError>;
}
