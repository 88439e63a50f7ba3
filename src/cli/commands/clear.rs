use anyhow::Result;
use clap::Args;

use super::{confirm, open_manager};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Subject whose store is emptied
    #[arg(required = true)]
    pub subject: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub force: bool,
}

pub async fn handle_clear(args: ClearArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if !args.force
        && !confirm(&format!(
            "This will delete every vector in subject '{}'. Continue?",
            args.subject
        ))?
    {
        println!("{}", formatter.format_message("Cancelled."));
        return Ok(());
    }

    let manager = open_manager(config)?;
    let cleared = if manager.clear_subject(&args.subject)? {
        true
    } else if manager.has_persisted(&args.subject) {
        // Present on disk but not loadable; overwrite it with an empty store.
        manager.reset_subject(&args.subject)?;
        true
    } else {
        false
    };

    let message = if cleared {
        format!("Subject '{}' has been cleared.", args.subject)
    } else {
        format!("No store found for subject '{}'.", args.subject)
    };
    println!("{}", formatter.format_message(&message));

    Ok(())
}
