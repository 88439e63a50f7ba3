use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

/// Keys accepted by `config set`.
const SETTABLE_KEYS: &[&str] = &[
    "embedding.backend",
    "embedding.url",
    "embedding.dimension",
    "embedding.timeout_secs",
    "embedding.batch_size",
    "embedding.max_tokens",
    "embedding.max_retries",
    "embedding.model_path",
    "tokenizer.path",
    "chunking.chunk_size",
    "chunking.chunk_overlap",
    "vector_store.base_path",
    "retrieval.top_k",
    "retrieval.k_per_subject",
    "retrieval.similar_k",
    "retrieval.score_threshold",
    "retrieval.default_format",
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration and data paths")]
    Path,
    #[command(about = "Set a configuration value, e.g. chunking.chunk_size 400")]
    Set { key: String, value: String },
}

pub async fn handle_config(
    cmd: ConfigCommand,
    config: &Config,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);
    let target = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?,
    };

    match cmd {
        ConfigCommand::Init { force } => {
            if target.exists() && !force {
                anyhow::bail!(
                    "Config already exists at: {}\nUse --force to overwrite.",
                    target.display()
                );
            }
            Config::default()
                .save_to(&target)
                .context("failed to write config")?;
            println!(
                "{}",
                formatter.format_message(&format!("Created config at: {}", target.display()))
            );
        }
        ConfigCommand::Show => {
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("# {}", target.display());
                println!();
                print!("{}", toml::to_string_pretty(config)?);
            }
        }
        ConfigCommand::Path => handle_path(config, &target)?,
        ConfigCommand::Set { key, value } => {
            let updated = set_value(config, &key, &value)?;
            updated.save_to(&target).context("failed to write config")?;
            println!(
                "{}",
                formatter.format_message(&format!("Set {} = {}", key, value))
            );
        }
    }

    Ok(())
}

fn handle_path(config: &Config, target: &Path) -> Result<()> {
    let state = if target.exists() { "active" } else { "would be" };
    println!("Config file ({}): {}", state, target.display());
    println!("Index root: {}", config.index_root()?.display());

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        }
    }
    Ok(())
}

/// Return a copy of `config` with `key` set, validated.
fn set_value(config: &Config, key: &str, raw: &str) -> Result<Config> {
    if !SETTABLE_KEYS.contains(&key) {
        anyhow::bail!(
            "unknown config key: {}\nKnown keys: {}",
            key,
            SETTABLE_KEYS.join(", ")
        );
    }
    let (section, field) = key
        .split_once('.')
        .ok_or_else(|| anyhow::anyhow!("config key must look like section.field"))?;

    let mut value = toml::Value::try_from(config).context("failed to encode config")?;
    let table = value
        .get_mut(section)
        .and_then(toml::Value::as_table_mut)
        .ok_or_else(|| anyhow::anyhow!("missing config section: {}", section))?;
    table.insert(field.to_string(), parse_value(raw));

    let updated: Config = value
        .try_into()
        .with_context(|| format!("invalid value for {}: {}", key, raw))?;
    updated.validate()?;
    Ok(updated)
}

fn parse_value(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_set_value() {
        let config = set_value(&Config::default(), "chunking.chunk_size", "400").unwrap();
        assert_eq!(config.chunking.chunk_size, 400);

        let config = set_value(&config, "retrieval.score_threshold", "0.75").unwrap();
        assert_eq!(config.retrieval.score_threshold, Some(0.75));

        let config = set_value(&config, "vector_store.base_path", "/tmp/rag").unwrap();
        assert_eq!(config.vector_store.base_path, Some(PathBuf::from("/tmp/rag")));
    }

    #[test]
    fn test_set_value_rejects_invalid() {
        assert!(set_value(&Config::default(), "chunking.bogus", "1").is_err());
        assert!(set_value(&Config::default(), "chunking.chunk_overlap", "900").is_err());
        assert!(set_value(&Config::default(), "embedding.dimension", "many").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), toml::Value::Boolean(true));
        assert_eq!(parse_value("12"), toml::Value::Integer(12));
        assert_eq!(parse_value("onnx"), toml::Value::String("onnx".to_string()));
    }
}
