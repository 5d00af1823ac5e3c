//! INI configuration file.
//!
//! Loaded from `~/.tilevault/config.ini` by default. Every key is optional;
//! a missing file yields the defaults.
//!
//! ```ini
//! [source]
//! kind = s3
//! endpoint = http://localhost:9000
//! bucket = tiles-bucket
//! path_style = true
//!
//! [cache]
//! max_sessions = 64
//! leaf_directories = 4096
//!
//! [logging]
//! level = debug
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::archive::DEFAULT_MAX_DIRECTORY_DEPTH;
use crate::backend::{Credentials, RetryPolicy, S3Config, DEFAULT_TIMEOUT_SECS};
use crate::logging::{LoggingConfig, DEFAULT_LOG_LEVEL, LOG_LEVELS};
use crate::service::{
    ArchiveLocator, HttpLocator, LocalDirectoryLocator, S3Locator, ServiceConfig,
    DEFAULT_EXTENSION, DEFAULT_MAX_SESSIONS,
};
use crate::session::{SessionConfig, DEFAULT_LEAF_CACHE_CAPACITY};

/// Name of the configuration directory under the home directory.
pub const CONFIG_DIR_NAME: &str = ".tilevault";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value {value:?} for {section}.{key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("missing required setting {section}.{key}")]
    Missing {
        section: &'static str,
        key: &'static str,
    },

    #[error("{0}")]
    Service(#[from] crate::service::ServiceError),
}

/// Path of the configuration directory, `~/.tilevault`.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path of the default configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Where archives are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[default]
    Local,
    Http,
    S3,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "file" => Ok(SourceKind::Local),
            "http" | "https" => Ok(SourceKind::Http),
            "s3" => Ok(SourceKind::S3),
            _ => Err("expected local, http or s3".to_string()),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Http => write!(f, "http"),
            SourceKind::S3 => write!(f, "s3"),
        }
    }
}

/// `[source]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub directory: Option<PathBuf>,
    pub base_url: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
    pub prefix: String,
    pub extension: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Local,
            directory: None,
            base_url: None,
            endpoint: None,
            bucket: None,
            region: crate::backend::DEFAULT_REGION.to_string(),
            access_key: None,
            secret_key: None,
            path_style: false,
            prefix: String::new(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub max_sessions: u64,
    pub leaf_directories: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            leaf_directories: DEFAULT_LEAF_CACHE_CAPACITY,
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: crate::backend::DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: crate::backend::DEFAULT_INITIAL_DELAY_MS,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub source: SourceSettings,
    pub cache: CacheSettings,
    /// `[resolver] max_directory_depth`
    pub max_directory_depth: usize,
    pub retry: RetrySettings,
    /// `[http] timeout_secs`
    pub http_timeout_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            cache: CacheSettings::default(),
            max_directory_depth: DEFAULT_MAX_DIRECTORY_DEPTH,
            retry: RetrySettings::default(),
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
            logging: LoggingConfig::default(),
        }
    }
}

impl ConfigFile {
    /// Loads the default file, or defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads a specific file. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let d = Self::default();
        let s = Settings(ini);

        let source = SourceSettings {
            kind: s.parse("source", "kind")?.unwrap_or(d.source.kind),
            directory: s.get("source", "directory").map(PathBuf::from),
            base_url: s.string("source", "base_url"),
            endpoint: s.string("source", "endpoint"),
            bucket: s.string("source", "bucket"),
            region: s.string("source", "region").unwrap_or(d.source.region),
            access_key: s.string("source", "access_key"),
            secret_key: s.string("source", "secret_key"),
            path_style: s.bool("source", "path_style")?.unwrap_or(d.source.path_style),
            prefix: s.string("source", "prefix").unwrap_or(d.source.prefix),
            extension: s
                .string("source", "extension")
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or(d.source.extension),
        };

        let cache = CacheSettings {
            max_sessions: s.positive("cache", "max_sessions")?.unwrap_or(d.cache.max_sessions),
            leaf_directories: s
                .positive("cache", "leaf_directories")?
                .unwrap_or(d.cache.leaf_directories),
        };

        let retry = RetrySettings {
            max_attempts: s.positive("retry", "max_attempts")?.unwrap_or(d.retry.max_attempts),
            initial_delay_ms: s
                .parse("retry", "initial_delay_ms")?
                .unwrap_or(d.retry.initial_delay_ms),
        };

        let level = s.string("logging", "level").unwrap_or(d.logging.level);
        if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                section: "logging",
                key: "level",
                value: level,
                reason: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }

        Ok(Self {
            source,
            cache,
            max_directory_depth: s
                .positive("resolver", "max_directory_depth")?
                .unwrap_or(d.max_directory_depth),
            retry,
            http_timeout_secs: s.positive("http", "timeout_secs")?.unwrap_or(d.http_timeout_secs),
            logging: LoggingConfig {
                level: level.to_ascii_lowercase(),
                file: s.get("logging", "file").map(PathBuf::from),
            },
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retry.max_attempts <= 1 {
            return RetryPolicy::None;
        }
        RetryPolicy::exponential_from(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
        )
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            leaf_cache_capacity: self.cache.leaf_directories,
            max_directory_depth: self.max_directory_depth,
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_sessions: self.cache.max_sessions,
            session: self.session_config(),
            retry: self.retry_policy(),
        }
    }

    /// Credentials from `[source]`, else from the AWS environment variables.
    pub fn s3_credentials(&self) -> Option<Credentials> {
        match (&self.source.access_key, &self.source.secret_key) {
            (Some(access), Some(secret)) => Some(Credentials::new(access, secret)),
            _ => Credentials::from_env(),
        }
    }

    /// Object store settings for `bucket`; endpoint, region and credentials
    /// come from `[source]`.
    pub fn s3_config(&self, bucket: &str) -> S3Config {
        let mut config = S3Config::new(bucket)
            .with_region(self.source.region.clone())
            .with_path_style(self.source.path_style)
            .with_credentials(self.s3_credentials());
        if let Some(endpoint) = &self.source.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        config
    }

    /// Builds the archive locator described by `[source]`.
    pub fn locator(&self) -> Result<Arc<dyn ArchiveLocator>, ConfigError> {
        let source = &self.source;
        let locator: Arc<dyn ArchiveLocator> = match source.kind {
            SourceKind::Local => {
                let directory = source.directory.clone().unwrap_or_else(|| PathBuf::from("."));
                Arc::new(LocalDirectoryLocator::new(directory).with_extension(&source.extension))
            }
            SourceKind::Http => {
                let base_url = source.base_url.clone().ok_or(ConfigError::Missing {
                    section: "source",
                    key: "base_url",
                })?;
                Arc::new(
                    HttpLocator::new(base_url, self.http_timeout())?
                        .with_extension(&source.extension),
                )
            }
            SourceKind::S3 => {
                let bucket = source.bucket.as_deref().ok_or(ConfigError::Missing {
                    section: "source",
                    key: "bucket",
                })?;
                Arc::new(
                    S3Locator::new(self.s3_config(bucket), self.http_timeout())?
                        .with_prefix(&source.prefix)
                        .with_extension(&source.extension),
                )
            }
        };
        Ok(locator)
    }
}

/// Typed lookups over an INI document.
struct Settings<'a>(&'a Ini);

impl<'a> Settings<'a> {
    fn get(&self, section: &str, key: &str) -> Option<&'a str> {
        self.0
            .section(Some(section))
            .and_then(|props| props.get(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn string(&self, section: &str, key: &str) -> Option<String> {
        self.get(section, key).map(str::to_string)
    }

    fn parse<T>(&self, section: &'static str, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(section, key)
            .map(|value| {
                value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                    section,
                    key,
                    value: value.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn positive<T>(&self, section: &'static str, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr + Default + PartialEq + fmt::Display,
        T::Err: fmt::Display,
    {
        match self.parse::<T>(section, key)? {
            Some(v) if v == T::default() => Err(ConfigError::InvalidValue {
                section,
                key,
                value: v.to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            other => Ok(other),
        }
    }

    fn bool(&self, section: &'static str, key: &'static str) -> Result<Option<bool>, ConfigError> {
        self.get(section, key)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    section,
                    key,
                    value: value.to_string(),
                    reason: "expected true or false".to_string(),
                }),
            })
            .transpose()
    }
}
