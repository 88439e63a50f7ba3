//! Ingest command implementation.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::{build_provider, open_manager};
use crate::cli::output::{IngestSummary, get_formatter};
use crate::models::{Chunk, Config, OutputFormat};
use crate::services::vector_store::validate_subject;
use crate::services::{
    EmbeddingProvider, TextChunker, VectorStoreManager, embed_chunks_with_progress,
    load_tokenizer,
};
use crate::sources::LocalSource;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Subject the documents belong to (e.g. math, physics)
    #[arg(required = true)]
    pub subject: String,

    /// File or directory to ingest (.txt and .md files)
    #[arg(required = true)]
    pub path: PathBuf,

    /// Glob patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    pub exclude: Vec<String>,

    /// Replace the subject's vectors once the new ones are embedded
    #[arg(long)]
    pub rebuild: bool,
}

pub async fn handle_ingest(args: IngestArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let start_time = Instant::now();
    validate_subject(&args.subject)?;

    let source = LocalSource::new(&args.path, &args.exclude)?;
    let documents = source.load(&args.subject)?;
    if documents.is_empty() {
        println!(
            "{}",
            formatter.format_message("No supported documents found to ingest.")
        );
        return Ok(());
    }

    let tokenizer = load_tokenizer(&config.tokenizer)?;
    let chunker = TextChunker::new(&config.chunking, tokenizer)?;
    let chunks = chunker
        .chunk_all(&documents)
        .context("failed to chunk documents")?;
    let chunk_count = chunks.len();
    debug!("Chunked {} documents into {} chunks", documents.len(), chunk_count);

    let provider = build_provider(config)?;
    let manager = open_manager(config)?;

    let pb = ProgressBar::new(chunk_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let stored = store_chunks(
        &manager,
        provider.as_ref(),
        &args.subject,
        chunks,
        config.embedding.batch_size as usize,
        args.rebuild,
        |n| pb.inc(n as u64),
    )
    .await;
    pb.finish_and_clear();
    let added = stored?;

    let total_vectors = manager
        .stats_all()?
        .into_iter()
        .find(|s| s.subject == args.subject)
        .map_or(0, |s| s.total_vectors);

    let summary = IngestSummary {
        subject: args.subject,
        documents_loaded: documents.len() as u64,
        chunks_created: chunk_count as u64,
        chunks_added: added as u64,
        total_vectors: total_vectors as u64,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_ingest(&summary));

    Ok(())
}

/// Embed `chunks` and store them under `subject`.
///
/// Nothing is written until every chunk has been embedded. With `rebuild`
/// the subject's previous vectors are replaced in one step, so a failed
/// embedding run leaves them untouched.
pub(crate) async fn store_chunks(
    manager: &VectorStoreManager,
    provider: &dyn EmbeddingProvider,
    subject: &str,
    chunks: Vec<Chunk>,
    batch_size: usize,
    rebuild: bool,
    on_batch: impl FnMut(usize),
) -> Result<usize> {
    let embedded = embed_chunks_with_progress(provider, chunks, batch_size, on_batch)
        .await
        .context("failed to embed chunks")?;

    let added = if rebuild {
        manager.replace_subject(subject, &embedded)?
    } else {
        manager.add_chunks_to_subject(subject, &embedded)?
    };
    Ok(added)
}
