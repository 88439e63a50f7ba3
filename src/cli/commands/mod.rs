mod clear;
mod config;
mod ingest;
mod multi;
mod search;
mod similar;
mod stats;

pub use clear::ClearArgs;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use multi::MultiArgs;
pub use search::SearchArgs;
pub use similar::SimilarArgs;

pub use clear::handle_clear;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use multi::handle_multi;
pub use search::handle_search;
pub use similar::handle_similar;
pub use stats::handle_stats;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::Config;
use crate::services::{
    Retriever, RetryingProvider, SharedEmbeddingProvider, VectorStoreManager, create_provider,
};
use crate::utils::RetryPolicy;

/// Manager over the configured index root with every loadable subject opened.
///
/// Subjects that fail to load are reported on stderr and left closed so the
/// rest stay usable.
pub(crate) fn open_manager(config: &Config) -> Result<Arc<VectorStoreManager>> {
    let root = config.index_root()?;
    let manager = VectorStoreManager::new(&root, config.embedding.dimension as usize)
        .with_context(|| format!("failed to open index root {}", root.display()))?;
    let report = manager
        .load_persisted()
        .context("failed to scan persisted subject stores")?;
    for (subject, error) in &report.failed {
        eprintln!(
            "{} subject '{}' could not be loaded: {}",
            console::style("warning:").yellow().bold(),
            subject,
            error
        );
    }
    Ok(Arc::new(manager))
}

/// Configured embedding provider with the configured retry policy applied.
pub(crate) fn build_provider(config: &Config) -> Result<SharedEmbeddingProvider> {
    let provider =
        create_provider(&config.embedding).context("failed to create embedding provider")?;
    Ok(Arc::new(RetryingProvider::new(
        provider,
        RetryPolicy::from_config(&config.embedding),
    )))
}

pub(crate) fn build_retriever(config: &Config) -> Result<Retriever> {
    Ok(Retriever::new(open_manager(config)?, build_provider(config)?))
}

/// Ask for confirmation on stdin. Anything but `y` declines.
pub(crate) fn confirm(prompt: &str) -> Result<bool> {
    eprintln!("{} [y/N]", console::style(prompt).yellow());
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
