//! Mapping archive ids to storage.
//!
//! A locator turns an archive id into a [`RangeReader`] for the object that
//! holds it. Ids are validated before any locator sees them, so an id can
//! never escape the configured directory, base URL or bucket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    build_client, BoxFuture, FileReader, HttpReader, RangeError, RangeReader, S3Config, S3Reader,
};

use super::error::ServiceError;

/// Default archive file extension.
pub const DEFAULT_EXTENSION: &str = "pmtiles";

/// Resolves archive ids to readers.
pub trait ArchiveLocator: Send + Sync {
    /// Opens a reader for `archive_id`. The id has already been validated.
    fn locate<'a>(
        &'a self,
        archive_id: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RangeReader>, ServiceError>>;

    /// Where archives come from, for logs.
    fn describe(&self) -> String;
}

/// Rejects ids that are empty or could address anything but a single
/// object name.
pub fn validate_archive_id(archive_id: &str) -> Result<(), ServiceError> {
    let invalid = archive_id.is_empty()
        || archive_id.contains(['/', '\\'])
        || archive_id.contains("..")
        || archive_id.chars().any(char::is_control);
    if invalid {
        return Err(ServiceError::InvalidArchiveId(archive_id.to_string()));
    }
    Ok(())
}

fn object_name(archive_id: &str, extension: &str) -> String {
    if extension.is_empty() {
        archive_id.to_string()
    } else {
        format!("{}.{}", archive_id, extension)
    }
}

/// Archives stored as `{directory}/{id}.{extension}`.
#[derive(Debug, Clone)]
pub struct LocalDirectoryLocator {
    directory: PathBuf,
    extension: String,
}

impl LocalDirectoryLocator {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

impl ArchiveLocator for LocalDirectoryLocator {
    fn locate<'a>(
        &'a self,
        archive_id: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RangeReader>, ServiceError>> {
        Box::pin(async move {
            let path = self.directory.join(object_name(archive_id, &self.extension));
            match FileReader::open(&path).await {
                Ok(reader) => Ok(Arc::new(reader) as Arc<dyn RangeReader>),
                Err(RangeError::NotFound(_)) => {
                    Err(ServiceError::ArchiveNotFound(archive_id.to_string()))
                }
                Err(e) => Err(ServiceError::archive(archive_id, e.into())),
            }
        })
    }

    fn describe(&self) -> String {
        format!("{}/*.{}", self.directory.display(), self.extension)
    }
}

/// Archives served as `{base_url}/{id}.{extension}`.
///
/// Readers share one connection pool. Nothing is requested until the
/// session loads, so a missing archive shows up as a 404 on first read.
#[derive(Debug, Clone)]
pub struct HttpLocator {
    client: reqwest::Client,
    base_url: String,
    extension: String,
}

impl HttpLocator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = build_client(timeout).map_err(|e| ServiceError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
        })
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// URL of the object holding `archive_id`.
    pub fn url_for(&self, archive_id: &str) -> String {
        format!("{}/{}", self.base_url, object_name(archive_id, &self.extension))
    }
}

impl ArchiveLocator for HttpLocator {
    fn locate<'a>(
        &'a self,
        archive_id: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RangeReader>, ServiceError>> {
        let reader = HttpReader::with_client(self.client.clone(), self.url_for(archive_id));
        Box::pin(async move { Ok(Arc::new(reader) as Arc<dyn RangeReader>) })
    }

    fn describe(&self) -> String {
        format!("{}/*.{}", self.base_url, self.extension)
    }
}

/// Archives stored as objects `{prefix}{id}.{extension}` in one bucket.
#[derive(Debug, Clone)]
pub struct S3Locator {
    client: reqwest::Client,
    config: Arc<S3Config>,
    prefix: String,
    extension: String,
}

impl S3Locator {
    pub fn new(config: S3Config, timeout: Duration) -> Result<Self, ServiceError> {
        let client = build_client(timeout).map_err(|e| ServiceError::Config(e.to_string()))?;
        Ok(Self {
            client,
            config: Arc::new(config),
            prefix: String::new(),
            extension: DEFAULT_EXTENSION.to_string(),
        })
    }

    /// Key prefix such as `tiles/`, prepended to every object name.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Object key holding `archive_id`.
    pub fn key_for(&self, archive_id: &str) -> String {
        format!("{}{}", self.prefix, object_name(archive_id, &self.extension))
    }
}

impl ArchiveLocator for S3Locator {
    fn locate<'a>(
        &'a self,
        archive_id: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RangeReader>, ServiceError>> {
        let result = S3Reader::with_client(
            self.client.clone(),
            Arc::clone(&self.config),
            self.key_for(archive_id),
        )
        .map(|reader| Arc::new(reader) as Arc<dyn RangeReader>)
        .map_err(|e| ServiceError::Config(e.to_string()));
        Box::pin(async move { result })
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}*.{}", self.config.bucket, self.prefix, self.extension)
    }
}
