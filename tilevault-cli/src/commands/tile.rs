//! `tile`: extract one tile payload.

use std::io::Write;
use std::path::PathBuf;

use tilevault::archive::ArchiveError;
use tilevault::compression::decompress;
use tilevault::config::ConfigFile;
use tilevault::TileCoord;

use super::common::open_session;
use crate::error::CliError;

/// Arguments of the tile command.
#[derive(Debug, Clone)]
pub struct TileArgs {
    pub source: String,
    pub z: u8,
    pub x: u32,
    pub y: u32,
    /// Write to this file instead of stdout.
    pub output: Option<PathBuf>,
    /// Decompress the payload before writing it.
    pub decode: bool,
}

/// Run the tile command.
pub async fn run(args: TileArgs, config: &ConfigFile) -> Result<(), CliError> {
    let coord = TileCoord::new(args.z, args.x, args.y)
        .map_err(|e| CliError::InvalidCoordinate(e.to_string()))?;

    let session = open_session(&args.source, config).await?;
    let data = session
        .read_tile(coord)
        .await?
        .ok_or_else(|| CliError::TileNotFound(coord.to_string()))?;

    let payload = if args.decode {
        let compression = session.header().await?.tile_compression;
        decompress(compression, &data).map_err(ArchiveError::from)?
    } else {
        data.to_vec()
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &payload)
                .map_err(|e| CliError::Output(format!("{}: {}", path.display(), e)))?;
            eprintln!("Wrote {} bytes to {}", payload.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&payload)
                .and_then(|_| stdout.flush())
                .map_err(|e| CliError::Output(e.to_string()))?;
        }
    }
    Ok(())
}
