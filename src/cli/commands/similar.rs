use anyhow::{Context, Result};
use clap::Args;

use super::build_retriever;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SimilarArgs {
    /// Subject to search
    #[arg(required = true)]
    pub subject: String,

    /// Chunk text to find neighbours for
    #[arg(required = true)]
    pub text: String,

    #[arg(long, short = 'k', help = "Maximum number of chunks to return")]
    pub k: Option<u32>,

    #[arg(long, help = "Keep chunks whose text equals the input")]
    pub include_self: bool,
}

pub async fn handle_similar(args: SimilarArgs, config: &Config, format: OutputFormat) -> Result<()> {
    if args.text.trim().is_empty() {
        anyhow::bail!("text cannot be empty");
    }

    let k = args.k.unwrap_or(config.retrieval.similar_k) as usize;
    let formatter = get_formatter(format);
    let retriever = build_retriever(config)?;

    let results = retriever
        .get_similar_chunks(&args.text, &args.subject, k, !args.include_self)
        .await
        .context("similarity search failed")?;

    print!(
        "{}",
        formatter.format_results("Similar chunks", &args.subject, &results)
    );
    Ok(())
}
