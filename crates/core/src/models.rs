use crate::chunking::ChunkingConfig;
use crate::filter::FilterThresholds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sentinel value the extractor uses for fields with no supporting text.
pub const NOT_MENTIONED: &str = "Not mentioned";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperChunk {
    pub chunk_id: String,
    pub source_document: String,
    pub page_number: u32,
    pub chunk_index: u32,
    pub text: String,
}

impl PaperChunk {
    /// Deterministic id for a chunk: pure function of document stem,
    /// page number, and chunk position, so re-ingesting the same corpus
    /// reproduces identical ids and store upserts stay idempotent.
    pub fn derive_id(document_stem: &str, page_number: u32, chunk_index: u32) -> String {
        format!("{document_stem}_p{page_number}_c{chunk_index}")
    }
}

#[derive(Debug, Clone)]
pub struct QueryHit {
    pub chunk: PaperChunk,
    pub distance: f64,
    /// `1 - distance`, kept unclamped: Chroma's default metric is
    /// squared L2, which is unbounded, so this can go negative. Display
    /// layers own any clamping.
    pub relevance: f64,
}

fn not_mentioned() -> String {
    NOT_MENTIONED.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFields {
    #[serde(default = "not_mentioned")]
    pub methodology: String,
    #[serde(default = "not_mentioned")]
    pub materials: String,
    #[serde(default = "not_mentioned")]
    pub findings: String,
    #[serde(default = "not_mentioned")]
    pub challenges: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunking: ChunkingConfig,
    pub filter: FilterThresholds,
    pub batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            filter: FilterThresholds::default(),
            batch_size: 100,
        }
    }
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct IngestionReport {
    pub total_chunks: usize,
    pub filtered_chunks: usize,
    pub stored_chunks: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub finished_at: DateTime<Utc>,
}
