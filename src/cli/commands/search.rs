use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use super::build_retriever;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Subject to search
    #[arg(required = true)]
    pub subject: String,

    /// Search query text
    #[arg(required = true)]
    pub query: String,

    #[arg(long, short = 'k', help = "Maximum number of chunks to return")]
    pub k: Option<u32>,

    #[arg(
        long,
        help = "Maximum squared L2 distance to keep (lower is closer)"
    )]
    pub max_distance: Option<f32>,

    #[arg(long, help = "Omit the source list")]
    pub no_sources: bool,
}

pub async fn handle_search(args: SearchArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let k = args.k.unwrap_or(config.retrieval.top_k);
    if k == 0 {
        anyhow::bail!("k must be at least 1");
    }

    let max_distance = args.max_distance.or(config.retrieval.score_threshold);
    if let Some(distance) = max_distance
        && distance < 0.0
    {
        anyhow::bail!("max_distance cannot be negative");
    }

    let formatter = get_formatter(format);
    let retriever = build_retriever(config)?;
    let start_time = Instant::now();

    let context = retriever
        .retrieve_with_context(query, &args.subject, k as usize, max_distance, !args.no_sources)
        .await
        .context("retrieval failed")?;

    debug!(
        "Retrieved {} chunks in {}ms",
        context.chunks.len(),
        start_time.elapsed().as_millis()
    );
    print!("{}", formatter.format_context(query, &args.subject, &context));

    Ok(())
}
