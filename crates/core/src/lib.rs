pub mod chunking;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod rank;
pub mod stores;
pub mod structured;
pub mod traits;

pub use chunking::{chunk_text, ChunkingConfig};
pub use error::{ExtractionError, IngestError, Result, SearchError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use filter::{is_useful, FilterThresholds};
pub use ingest::{digest_file, discover_pdf_files, ingest_directory, ingest_directory_with};
pub use llm::OpenAiCompletions;
pub use models::{
    ExtractedFields, IngestionOptions, IngestionReport, PaperChunk, QueryHit, SkippedPdf,
    NOT_MENTIONED,
};
pub use rank::search;
pub use stores::ChromaStore;
pub use structured::StructuredExtractor;
pub use traits::{CompletionClient, CompletionRequest, StoreMatch, VectorStore};
