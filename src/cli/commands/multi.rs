use anyhow::{Context, Result};
use clap::Args;

use super::build_retriever;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct MultiArgs {
    /// Search query text
    #[arg(required = true)]
    pub query: String,

    #[arg(
        long,
        short = 's',
        required = true,
        value_delimiter = ',',
        help = "Subjects to search (comma-separated)"
    )]
    pub subjects: Vec<String>,

    #[arg(long, short = 'k', help = "Results per subject")]
    pub k: Option<u32>,
}

pub async fn handle_multi(args: MultiArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let mut subjects: Vec<String> = args
        .subjects
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    subjects.dedup();
    if subjects.is_empty() {
        anyhow::bail!("at least one subject is required");
    }

    let k = args.k.unwrap_or(config.retrieval.k_per_subject) as usize;
    let formatter = get_formatter(format);
    let retriever = build_retriever(config)?;

    let results = retriever
        .retrieve_multi_subject(query, &subjects, k)
        .await
        .context("retrieval failed")?;

    print!("{}", formatter.format_multi(query, &results));
    Ok(())
}
