use anyhow::Result;

use super::open_manager;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

pub async fn handle_stats(config: &Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let manager = open_manager(config)?;

    let stats = manager.stats_all()?;
    print!("{}", formatter.format_stats(&stats));
    Ok(())
}
