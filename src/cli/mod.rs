//! CLI module for the subject RAG tool.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Subject-isolated retrieval over local course material.
#[derive(Debug, Parser)]
#[command(name = "srag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(long, short = 'c', global = true, help = "Path to a config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load, chunk and embed documents into a subject store
    Ingest(commands::IngestArgs),

    /// Retrieve grounding context from one subject
    Search(commands::SearchArgs),

    /// Find chunks similar to a piece of text
    Similar(commands::SimilarArgs),

    /// Search several subjects independently
    Multi(commands::MultiArgs),

    /// Show per-subject store statistics
    Stats,

    /// Remove every vector from a subject store
    Clear(commands::ClearArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "srag", "search", "math", "what is a limit", "-k", "3", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.subject, "math");
                assert_eq!(args.k, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_multi_subjects() {
        let cli = Cli::try_parse_from(["srag", "multi", "energy", "--subjects", "math,physics"])
            .unwrap();
        match cli.command {
            Commands::Multi(args) => assert_eq!(args.subjects, vec!["math", "physics"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
