use chrono::Utc;
use clap::{Parser, Subcommand};
use sci_search_core::{
    ingest_directory, search, ChromaStore, IngestionOptions, OpenAiCompletions,
    StructuredExtractor, VectorStore,
};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sci-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Chroma base URL
    #[arg(long, default_value = "http://localhost:8000")]
    chroma_url: String,

    /// Chroma collection name
    #[arg(long, default_value = "scientific_papers")]
    collection: String,

    /// Embedding model the collection is built with; must match between
    /// ingestion and query time.
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// OpenAI API key used for structured extraction
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    openai_api_key: String,

    /// Completion model used for structured extraction
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    openai_model: String,

    /// Timeout in seconds applied to store and language-model calls
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a folder of PDFs into the vector store.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: String,

        /// Chunk window size in characters.
        #[arg(long, default_value = "1000")]
        chunk_size: usize,

        /// Characters shared between consecutive chunks.
        #[arg(long, default_value = "200")]
        overlap: usize,

        /// Chunks flushed to the store per batch.
        #[arg(long, default_value = "100")]
        batch_size: usize,
    },
    /// Run a conceptual query and print ranked chunks.
    Search {
        /// Query text
        #[arg(long)]
        query: String,
        /// Number of results to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Search, pick one result, and extract structured fields from it.
    Extract {
        /// Query text
        #[arg(long)]
        query: String,
        /// 1-based rank of the result to extract from.
        #[arg(long, default_value = "1")]
        rank: usize,
        /// Number of results to retrieve before picking one.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Print corpus statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs);

    let store = ChromaStore::connect(
        &cli.chroma_url,
        &cli.collection,
        &cli.embedding_model,
        timeout,
    )
    .await
    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    info!(
        collection = %cli.collection,
        started_at = %Utc::now().to_rfc3339(),
        "sci-search boot"
    );

    match cli.command {
        Command::Ingest {
            folder,
            chunk_size,
            overlap,
            batch_size,
        } => {
            let options = IngestionOptions {
                chunking: sci_search_core::ChunkingConfig {
                    chunk_size,
                    overlap,
                },
                batch_size,
                ..IngestionOptions::default()
            };

            let report = ingest_directory(&store, Path::new(&folder), &options)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }

            println!(
                "ingestion complete at {}: {} chunks total, {} filtered, {} stored, {} files skipped",
                report.finished_at.to_rfc3339(),
                report.total_chunks,
                report.filtered_chunks,
                report.stored_chunks,
                report.skipped_files.len()
            );
        }
        Command::Search { query, top_k } => {
            let hits = search(&store, &query, top_k)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("query: {query}");
            println!("{} result(s)", hits.len());
            for (index, hit) in hits.iter().enumerate() {
                print_hit(index, hit);
            }
        }
        Command::Extract { query, rank, top_k } => {
            anyhow::ensure!(rank >= 1, "rank is 1-based");

            let hits = search(&store, &query, top_k.max(rank))
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let hit = hits.get(rank - 1).ok_or_else(|| {
                anyhow::anyhow!("only {} result(s) available, wanted rank {rank}", hits.len())
            })?;
            print_hit(rank - 1, hit);

            let completions = OpenAiCompletions::new(
                cli.openai_api_key.clone(),
                cli.openai_model.clone(),
                timeout,
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let extractor = StructuredExtractor::new(completions);

            let fields = extractor
                .extract(&hit.chunk.text, &query)
                .await
                .map_err(|error| anyhow::anyhow!("extraction failed: {error}"))?;

            println!("methodology: {}", fields.methodology);
            println!("materials:   {}", fields.materials);
            println!("findings:    {}", fields.findings);
            println!("challenges:  {}", fields.challenges);
        }
        Command::Stats => {
            let total = store
                .count()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("stored chunks: {total}");
        }
    }

    Ok(())
}

fn print_hit(index: usize, hit: &sci_search_core::QueryHit) {
    println!(
        "[{}] relevance={:.1}% distance={:.4} source={} page={} chunk={}",
        index + 1,
        hit.relevance * 100.0,
        hit.distance,
        hit.chunk.source_document,
        hit.chunk.page_number,
        hit.chunk.chunk_index
    );
    println!("  {}", hit.chunk.text);
}
