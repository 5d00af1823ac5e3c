//! TileVault CLI - Command-line interface
//!
//! Inspects PMTiles archives on local disk, behind HTTP, or in S3 through
//! the TileVault library.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tilevault::config::ConfigFile;
use tilevault::logging::init_logging;

mod commands;
mod error;

use commands::config::ConfigCommands;
use commands::tile::TileArgs;
use error::CliError;

/// TileVault - read tiles out of range-addressed PMTiles archives
#[derive(Parser)]
#[command(name = "tilevault")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.tilevault/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an archive's header and metadata
    Info {
        /// Local path, http(s):// URL, or s3://bucket/key
        source: String,
    },

    /// Extract a single tile
    Tile {
        /// Local path, http(s):// URL, or s3://bucket/key
        source: String,
        z: u8,
        x: u32,
        y: u32,

        /// Write the tile to FILE instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Decompress the tile payload
        #[arg(long)]
        decode: bool,
    },

    /// Print the TileJSON document for an archive
    Tilejson {
        /// Local path, http(s):// URL, or s3://bucket/key
        source: String,

        /// Tile URL template; {archive} is replaced with the archive name
        #[arg(long, value_name = "TEMPLATE")]
        tiles_url: String,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    let mut logging = config.logging.clone();
    match cli.verbose {
        0 => {}
        1 => logging.level = "debug".to_string(),
        _ => logging.level = "trace".to_string(),
    }
    let _log_guard = init_logging(&logging)?;

    if let Commands::Config { command } = cli.command {
        return commands::config::run(command, &config, cli.config.as_deref());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    runtime.block_on(async {
        match cli.command {
            Commands::Info { source } => commands::info::run(&source, &config).await,
            Commands::Tile {
                source,
                z,
                x,
                y,
                output,
                decode,
            } => {
                let args = TileArgs {
                    source,
                    z,
                    x,
                    y,
                    output,
                    decode,
                };
                commands::tile::run(args, &config).await
            }
            Commands::Tilejson { source, tiles_url } => {
                commands::tilejson::run(&source, &tiles_url, &config).await
            }
            Commands::Config { .. } => Ok(()),
        }
    })
}
