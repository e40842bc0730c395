#[cfg(test)]
mod tests;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::providers::Provider;

/// Smallest chunk size accepted from the environment
pub const MIN_CHUNK_SIZE: usize = 100;

const DEFAULT_PROVIDER: &str = "openai";
const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GOOGLE_EMBEDDING_MODEL: &str = "models/embedding-001";
const DEFAULT_GOOGLE_CHAT_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_COLLECTION: &str = "pdf_documents";
const DEFAULT_DOCUMENT_PATH: &str = "document.pdf";
const DEFAULT_SEARCH_K: usize = 10;
/// Log level used when `LOG_LEVEL` is unset
pub const DEFAULT_LOG_LEVEL: &str = "info";

const OPENAI_KEY_PREFIX: &str = "sk-";
const GOOGLE_MIN_KEY_LENGTH: usize = 30;
const STORAGE_SCHEMES: &[&str] = &["file", "s3", "gs", "az"];
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Runtime configuration, resolved once at start-up and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub provider: Provider,
    pub openai: ProviderSettings,
    pub google: ProviderSettings,
    pub storage: StorageUrl,
    pub collection: String,
    pub chunking: ChunkingConfig,
    pub search_k: usize,
    pub document_path: PathBuf,
    pub log_level: String,
}

/// Credentials and model identifiers for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub chat_model: String,
    pub base_url: Url,
}

/// Location of the vector database, e.g. `file:///var/lib/pdf-rag` or `s3://bucket/prefix`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUrl {
    scheme: String,
    location: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid LLM_PROVIDER: '{0}' (accepted values: 'openai' or 'google')")]
    InvalidProvider(String),
    #[error("{0} is not set. Configure the environment variable or the .env file")]
    MissingApiKey(&'static str),
    #[error("{key} looks invalid: {reason}")]
    MalformedApiKey {
        key: &'static str,
        reason: &'static str,
    },
    #[error("DATABASE_URL is not set. Configure the environment variable or the .env file")]
    MissingStorageUrl,
    #[error("Invalid DATABASE_URL: '{0}' (must start with file://, s3://, gs:// or az://)")]
    InvalidStorageUrl(String),
    #[error("CHUNK_SIZE too small: {0} (minimum: {MIN_CHUNK_SIZE})")]
    ChunkSizeTooSmall(usize),
    #[error("CHUNK_OVERLAP ({overlap}) must be smaller than CHUNK_SIZE ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
    #[error("SEARCH_K must be at least 1, got {0}")]
    InvalidSearchK(usize),
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} is not a valid URL: '{value}'")]
    InvalidUrl { key: &'static str, value: String },
    #[error(
        "Invalid collection name: '{0}' (use ASCII letters, digits, '_' or '-', cannot be empty)"
    )]
    InvalidCollection(String),
    #[error("Invalid LOG_LEVEL: '{0}' (must be one of trace, debug, info, warn, error)")]
    InvalidLogLevel(String),
}

/// Outcome of seeding the process environment from a `.env` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(PathBuf),
    Missing,
    Unreadable(String),
}

impl EnvFile {
    /// Load `.env` from the working directory or one of its parents
    #[inline]
    pub fn load() -> Self {
        Self::from_result(dotenv::dotenv())
    }

    #[inline]
    pub fn from_result(result: dotenv::Result<PathBuf>) -> Self {
        match result {
            Ok(path) => Self::Loaded(path),
            Err(e) if e.not_found() => Self::Missing,
            Err(e) => Self::Unreadable(e.to_string()),
        }
    }

    /// Report the outcome once logging is initialised
    #[inline]
    pub fn log(&self) {
        match self {
            Self::Loaded(path) => debug!("Loaded environment overrides from {}", path.display()),
            Self::Missing => debug!("No .env file found, using process environment"),
            Self::Unreadable(reason) => warn!("Ignoring unreadable .env file: {}", reason),
        }
    }
}

impl Config {
    /// Resolve the configuration from the process environment.
    ///
    /// Call [`EnvFile::load`] first for `.env` overrides to apply.
    #[inline]
    pub fn resolve() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary variable source.
    ///
    /// Blank values are treated as unset. Validation runs before returning, so
    /// a `Config` obtained here always satisfies its invariants.
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let provider_name = var("LLM_PROVIDER").unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        let provider = provider_name
            .parse::<Provider>()
            .map_err(|_| ConfigError::InvalidProvider(provider_name.clone()))?;

        let openai = ProviderSettings {
            api_key: var("OPENAI_API_KEY"),
            embedding_model: var("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()),
            chat_model: var("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_CHAT_MODEL.to_string()),
            base_url: parse_url(
                "OPENAI_BASE_URL",
                var("OPENAI_BASE_URL").as_deref(),
                DEFAULT_OPENAI_BASE_URL,
            )?,
        };

        let google = ProviderSettings {
            api_key: var("GOOGLE_API_KEY"),
            embedding_model: var("GOOGLE_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_EMBEDDING_MODEL.to_string()),
            chat_model: var("GOOGLE_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_CHAT_MODEL.to_string()),
            base_url: parse_url(
                "GOOGLE_BASE_URL",
                var("GOOGLE_BASE_URL").as_deref(),
                DEFAULT_GOOGLE_BASE_URL,
            )?,
        };

        let storage = StorageUrl::parse(&var("DATABASE_URL").unwrap_or_else(default_storage_url))?;

        let chunking = ChunkingConfig {
            chunk_size: parse_number("CHUNK_SIZE", var("CHUNK_SIZE"), 1000)?,
            chunk_overlap: parse_number("CHUNK_OVERLAP", var("CHUNK_OVERLAP"), 150)?,
        };

        let config = Self {
            provider,
            openai,
            google,
            storage,
            collection: var("COLLECTION_NAME").unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            chunking,
            search_k: parse_number("SEARCH_K", var("SEARCH_K"), DEFAULT_SEARCH_K)?,
            document_path: var("PDF_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_DOCUMENT_PATH), PathBuf::from),
            log_level: var("LOG_LEVEL")
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
        };

        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_credentials()?;
        self.validate_chunking_config()?;

        if self.search_k < 1 {
            return Err(ConfigError::InvalidSearchK(self.search_k));
        }

        if !is_valid_collection_name(&self.collection) {
            return Err(ConfigError::InvalidCollection(self.collection.clone()));
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }

        Ok(())
    }

    fn validate_credentials(&self) -> Result<(), ConfigError> {
        match self.provider {
            Provider::OpenAi => {
                let key = self
                    .openai
                    .api_key
                    .as_deref()
                    .ok_or(ConfigError::MissingApiKey("OPENAI_API_KEY"))?;
                if !key.starts_with(OPENAI_KEY_PREFIX) {
                    return Err(ConfigError::MalformedApiKey {
                        key: "OPENAI_API_KEY",
                        reason: "OpenAI keys start with 'sk-'",
                    });
                }
            }
            Provider::Google => {
                let key = self
                    .google
                    .api_key
                    .as_deref()
                    .ok_or(ConfigError::MissingApiKey("GOOGLE_API_KEY"))?;
                if key.chars().count() < GOOGLE_MIN_KEY_LENGTH {
                    return Err(ConfigError::MalformedApiKey {
                        key: "GOOGLE_API_KEY",
                        reason: "Google AI keys usually have 39 or more characters",
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;

        if chunking.chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigError::ChunkSizeTooSmall(chunking.chunk_size));
        }

        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: chunking.chunk_overlap,
                size: chunking.chunk_size,
            });
        }

        Ok(())
    }

    /// Settings of the provider selected by `LLM_PROVIDER`
    #[inline]
    pub fn active_provider(&self) -> &ProviderSettings {
        match self.provider {
            Provider::OpenAi => &self.openai,
            Provider::Google => &self.google,
        }
    }
}

impl StorageUrl {
    #[inline]
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingStorageUrl);
        }

        let (scheme, location) = raw
            .split_once("://")
            .ok_or_else(|| ConfigError::InvalidStorageUrl(raw.to_string()))?;
        let scheme = scheme.to_lowercase();

        if !STORAGE_SCHEMES.contains(&scheme.as_str()) || location.is_empty() {
            return Err(ConfigError::InvalidStorageUrl(raw.to_string()));
        }

        Ok(Self {
            scheme,
            location: location.to_string(),
        })
    }

    /// Storage rooted at a local directory
    #[inline]
    pub fn local(path: &Path) -> Self {
        Self {
            scheme: "file".to_string(),
            location: path.display().to_string(),
        }
    }

    #[inline]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Local directory backing this storage, `None` for object stores
    #[inline]
    pub fn local_path(&self) -> Option<PathBuf> {
        (self.scheme == "file").then(|| PathBuf::from(&self.location))
    }

    /// URI handed to LanceDB: a plain path for local storage, the full URL otherwise
    #[inline]
    pub fn connection_uri(&self) -> String {
        self.local_path()
            .map_or_else(|| self.to_string(), |path| path.display().to_string())
    }
}

impl fmt::Display for StorageUrl {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.location)
    }
}

fn default_storage_url() -> String {
    dirs::data_dir().map_or_else(
        || "file://./lancedb".to_string(),
        |dir| format!("file://{}", dir.join("pdf-rag").join("lancedb").display()),
    )
}

fn parse_number(
    key: &'static str,
    value: Option<String>,
    default: usize,
) -> Result<usize, ConfigError> {
    value.map_or(Ok(default), |value| {
        value
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidNumber { key, value })
    })
}

fn parse_url(key: &'static str, value: Option<&str>, default: &str) -> Result<Url, ConfigError> {
    let raw = value.unwrap_or(default);
    Url::parse(raw).map_err(|_| ConfigError::InvalidUrl {
        key,
        value: raw.to_string(),
    })
}

fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
