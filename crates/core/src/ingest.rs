use crate::chunking::chunk_text;
use crate::error::IngestError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::filter::is_useful;
use crate::models::{IngestionOptions, IngestionReport, PaperChunk, SkippedPdf};
use crate::traits::VectorStore;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

struct DocumentChunks {
    accepted: Vec<PaperChunk>,
    filtered: usize,
}

fn collect_document_chunks(
    extractor: &dyn PdfExtractor,
    path: &Path,
    options: &IngestionOptions,
) -> Result<DocumentChunks, IngestError> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;
    let source_document = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(stem)
        .to_string();

    let checksum = digest_file(path)?;
    debug!(path = %path.display(), %checksum, "fingerprinted document");

    let pages = extractor.extract_pages(path)?;

    let mut accepted = Vec::new();
    let mut filtered = 0usize;

    for page in pages {
        for (index, text) in chunk_text(&page.text, &options.chunking)?
            .into_iter()
            .enumerate()
        {
            let chunk_index = index as u32;
            if !is_useful(&text, &options.filter) {
                filtered += 1;
                continue;
            }

            accepted.push(PaperChunk {
                chunk_id: PaperChunk::derive_id(stem, page.number, chunk_index),
                source_document: source_document.clone(),
                page_number: page.number,
                chunk_index,
                text,
            });
        }
    }

    Ok(DocumentChunks { accepted, filtered })
}

/// Ingests every PDF under `folder` into the store: extract pages,
/// chunk, quality-filter, then flush accepted chunks in fixed-size
/// batches. One unreadable document is skipped and reported; a batch
/// that still fails after the store's own retries aborts the run, with
/// already-committed batches left in place.
pub async fn ingest_directory(
    store: &dyn VectorStore,
    folder: &Path,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    ingest_directory_with(store, &LopdfExtractor, folder, options).await
}

pub async fn ingest_directory_with(
    store: &dyn VectorStore,
    extractor: &dyn PdfExtractor,
    folder: &Path,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    options.chunking.validate()?;
    if options.batch_size == 0 {
        return Err(IngestError::InvalidArgument(
            "batch_size must be positive".to_string(),
        ));
    }

    let files = discover_pdf_files(folder);
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    info!(folder = %folder.display(), file_count = files.len(), "starting ingestion");

    let mut pending: Vec<PaperChunk> = Vec::new();
    let mut skipped_files = Vec::new();
    let mut total_chunks = 0usize;
    let mut filtered_chunks = 0usize;
    let mut stored_chunks = 0usize;

    for path in files {
        match collect_document_chunks(extractor, &path, options) {
            Ok(document) => {
                total_chunks += document.accepted.len() + document.filtered;
                filtered_chunks += document.filtered;
                info!(
                    path = %path.display(),
                    accepted = document.accepted.len(),
                    filtered = document.filtered,
                    "processed document"
                );
                pending.extend(document.accepted);

                while pending.len() >= options.batch_size {
                    let batch: Vec<PaperChunk> =
                        pending.drain(..options.batch_size).collect();
                    flush_batch(store, &batch, &mut stored_chunks).await?;
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping document");
                skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    for batch in pending.chunks(options.batch_size) {
        flush_batch(store, batch, &mut stored_chunks).await?;
    }

    info!(
        total_chunks,
        filtered_chunks,
        stored_chunks,
        skipped = skipped_files.len(),
        "ingestion complete"
    );

    Ok(IngestionReport {
        total_chunks,
        filtered_chunks,
        stored_chunks,
        skipped_files,
        finished_at: Utc::now(),
    })
}

async fn flush_batch(
    store: &dyn VectorStore,
    batch: &[PaperChunk],
    stored_chunks: &mut usize,
) -> Result<(), IngestError> {
    store
        .add(batch)
        .await
        .map_err(|source| IngestError::StoreWrite {
            stored_chunks: *stored_chunks,
            source,
        })?;
    *stored_chunks += batch.len();
    debug!(batch_len = batch.len(), stored = *stored_chunks, "flushed batch");
    Ok(())
}
