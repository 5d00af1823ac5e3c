//! Configuration inspection commands.
//!
//! Provides `config list` and `config path` for viewing the effective
//! settings and where they are read from.

use std::path::Path;

use clap::Subcommand;
use tilevault::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// List the effective configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(
    command: ConfigCommands,
    config: &ConfigFile,
    explicit_path: Option<&Path>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::List => {
            for (key, value) in settings(config) {
                println!("{} = {}", key, value);
            }
            Ok(())
        }
        ConfigCommands::Path => {
            let path = explicit_path
                .map(Path::to_path_buf)
                .unwrap_or_else(config_file_path);
            println!("{}", path.display());
            if !path.exists() {
                println!("(file does not exist, defaults in use)");
            }
            Ok(())
        }
    }
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "(not set)".to_string())
}

/// Settings as `section.key` pairs. Secrets are masked.
fn settings(config: &ConfigFile) -> Vec<(&'static str, String)> {
    let source = &config.source;
    let masked = |v: &Option<String>| {
        if v.is_some() {
            "********".to_string()
        } else {
            "(not set)".to_string()
        }
    };
    vec![
        ("source.kind", source.kind.to_string()),
        (
            "source.directory",
            optional(&source.directory.as_ref().map(|d| d.display().to_string())),
        ),
        ("source.base_url", optional(&source.base_url)),
        ("source.endpoint", optional(&source.endpoint)),
        ("source.bucket", optional(&source.bucket)),
        ("source.region", source.region.clone()),
        ("source.access_key", masked(&source.access_key)),
        ("source.secret_key", masked(&source.secret_key)),
        ("source.path_style", source.path_style.to_string()),
        ("source.prefix", source.prefix.clone()),
        ("source.extension", source.extension.clone()),
        ("cache.max_sessions", config.cache.max_sessions.to_string()),
        ("cache.leaf_directories", config.cache.leaf_directories.to_string()),
        (
            "resolver.max_directory_depth",
            config.max_directory_depth.to_string(),
        ),
        ("retry.max_attempts", config.retry.max_attempts.to_string()),
        (
            "retry.initial_delay_ms",
            config.retry.initial_delay_ms.to_string(),
        ),
        ("http.timeout_secs", config.http_timeout_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        (
            "logging.file",
            optional(&config.logging.file.as_ref().map(|f| f.display().to_string())),
        ),
    ]
}
