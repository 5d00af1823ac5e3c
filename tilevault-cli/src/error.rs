//! CLI error type.

use std::fmt;

use tilevault::archive::ArchiveError;
use tilevault::backend::RangeError;
use tilevault::config::ConfigError;
use tilevault::logging::LoggingError;

/// Errors reported by CLI commands. Every variant exits with status 1.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is incomplete.
    Config(String),
    /// Logging could not be initialized.
    Logging(String),
    /// The async runtime could not be started.
    Runtime(String),
    /// The source argument is not a usable path or URL.
    InvalidSource(String),
    /// The tile coordinate is not on the grid.
    InvalidCoordinate(String),
    /// The archive could not be read.
    Archive(ArchiveError),
    /// The archive holds no tile at the coordinate.
    TileNotFound(String),
    /// Writing output failed.
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Runtime(msg) => write!(f, "Failed to start runtime: {}", msg),
            CliError::InvalidSource(msg) => write!(f, "Invalid source: {}", msg),
            CliError::InvalidCoordinate(msg) => write!(f, "Invalid tile coordinate: {}", msg),
            CliError::Archive(e) => write!(f, "Archive error: {}", e),
            CliError::TileNotFound(coord) => write!(f, "Tile {} not found in archive", coord),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Archive(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<ArchiveError> for CliError {
    fn from(e: ArchiveError) -> Self {
        CliError::Archive(e)
    }
}

impl From<RangeError> for CliError {
    fn from(e: RangeError) -> Self {
        CliError::Archive(ArchiveError::RangeUnavailable(e))
    }
}
