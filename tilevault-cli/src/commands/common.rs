//! Archive source parsing shared across commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tilevault::backend::{FileReader, HttpReader, RangeReader, RetryPolicy, RetryingReader, S3Reader};
use tilevault::config::ConfigFile;
use tilevault::ArchiveSession;
use tracing::debug;

use crate::error::CliError;

/// Where an archive given on the command line lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Http(String),
    S3 { bucket: String, key: String },
}

impl Source {
    /// Parses a local path, an `http(s)://` URL, or `s3://bucket/key`.
    pub fn parse(source: &str) -> Result<Self, CliError> {
        if let Some(rest) = source.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
                .ok_or_else(|| {
                    CliError::InvalidSource(format!("expected s3://bucket/key, got {}", source))
                })?;
            return Ok(Source::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(Source::Http(source.to_string()));
        }
        if source.is_empty() {
            return Err(CliError::InvalidSource("empty source".to_string()));
        }
        Ok(Source::Local(PathBuf::from(source)))
    }

    /// Archive name used in logs and TileJSON: the object name without extension.
    pub fn name(&self) -> String {
        let last = match self {
            Source::Local(path) => path.to_string_lossy().into_owned(),
            Source::Http(url) => url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
            Source::S3 { key, .. } => key.clone(),
        };
        Path::new(&last)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(last)
    }

    /// Opens a reader, wrapped in the configured retry policy.
    pub async fn open(&self, config: &ConfigFile) -> Result<Arc<dyn RangeReader>, CliError> {
        let reader: Arc<dyn RangeReader> = match self {
            Source::Local(path) => Arc::new(FileReader::open(path).await?),
            Source::Http(url) => Arc::new(HttpReader::new(url.clone(), config.http_timeout())?),
            Source::S3 { bucket, key } => Arc::new(S3Reader::new(
                config.s3_config(bucket),
                key.clone(),
                config.http_timeout(),
            )?),
        };
        Ok(match config.retry_policy() {
            RetryPolicy::None => reader,
            policy => Arc::new(RetryingReader::new(reader, policy)),
        })
    }
}

/// Opens `source` and loads its header and root directory.
pub async fn open_session(source: &str, config: &ConfigFile) -> Result<ArchiveSession, CliError> {
    let source = Source::parse(source)?;
    debug!(source = ?source, "Opening archive");
    let reader = source.open(config).await?;
    let session = ArchiveSession::new(source.name(), reader, config.session_config());
    session.open().await?;
    Ok(session)
}
