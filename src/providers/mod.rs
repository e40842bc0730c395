// Model providers
// Embedding and chat clients for the supported LLM vendors, selected from configuration

pub mod google;
pub mod openai;

#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, mask_key};
pub use google::{GoogleChat, GoogleClient, GoogleEmbeddings};
pub use openai::{OpenAiChat, OpenAiClient, OpenAiEmbeddings};

/// Temperature used when none is requested: deterministic answers
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Supported LLM vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Google,
}

impl Provider {
    /// Name shown to users
    #[inline]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Google => "Google Gemini",
        }
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "google" => Ok(Self::Google),
            _ => Err(ProviderError::UnsupportedProvider(s.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Google => "google",
        })
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unsupported provider: '{0}' (supported: openai, google)")]
    UnsupportedProvider(String),
    #[error("{0} is not set")]
    MissingApiKey(&'static str),
    #[error("Provider API returned HTTP {status}")]
    Http { status: u16 },
    #[error("Request to provider failed: {0}")]
    Transport(String),
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("Provider returned an empty response")]
    EmptyResponse,
    #[error("Provider task failed: {0}")]
    Task(String),
}

impl From<ureq::Error> for ProviderError {
    #[inline]
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) => Self::Http { status },
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Turns text into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed documents; the output has one vector per input, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embed a search query
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    fn model(&self) -> &str;
}

/// Produces a completion for a prompt
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    fn model(&self) -> &str;
}

/// Embedding model of the configured provider
#[derive(Debug, Clone)]
pub enum EmbeddingModel {
    OpenAi(OpenAiEmbeddings),
    Google(GoogleEmbeddings),
}

/// Chat model of the configured provider
#[derive(Debug, Clone)]
pub enum ChatModel {
    OpenAi(OpenAiChat),
    Google(GoogleChat),
}

impl ChatModel {
    #[inline]
    pub fn temperature(&self) -> f32 {
        match self {
            Self::OpenAi(chat) => chat.temperature(),
            Self::Google(chat) => chat.temperature(),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingModel {
    #[inline]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        match self {
            Self::OpenAi(model) => model.embed(texts).await,
            Self::Google(model) => model.embed(texts).await,
        }
    }

    #[inline]
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match self {
            Self::OpenAi(model) => model.embed_one(text).await,
            Self::Google(model) => model.embed_one(text).await,
        }
    }

    #[inline]
    fn model(&self) -> &str {
        match self {
            Self::OpenAi(model) => model.model(),
            Self::Google(model) => model.model(),
        }
    }
}

#[async_trait]
impl Generator for ChatModel {
    #[inline]
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        match self {
            Self::OpenAi(chat) => chat.generate(prompt).await,
            Self::Google(chat) => chat.generate(prompt).await,
        }
    }

    #[inline]
    fn model(&self) -> &str {
        match self {
            Self::OpenAi(chat) => chat.model(),
            Self::Google(chat) => chat.model(),
        }
    }
}

/// Summary of the active provider, without secrets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub provider: Provider,
    pub name: &'static str,
    pub embedding_model: String,
    pub chat_model: String,
    /// API key with all but the first and last four characters hidden
    pub masked_key: String,
}

#[inline]
pub fn provider_info(config: &Config) -> ProviderInfo {
    let settings = config.active_provider();
    ProviderInfo {
        provider: config.provider,
        name: config.provider.display_name(),
        embedding_model: settings.embedding_model.clone(),
        chat_model: settings.chat_model.clone(),
        masked_key: mask_key(settings.api_key.as_deref()),
    }
}

#[inline]
pub fn create_embedder(config: &Config) -> Result<EmbeddingModel, ProviderError> {
    let settings = config.active_provider();
    info!(
        "Creating {} embedding model {}",
        config.provider.display_name(),
        settings.embedding_model
    );

    let model = match config.provider {
        Provider::OpenAi => EmbeddingModel::OpenAi(OpenAiEmbeddings::new(
            OpenAiClient::new(settings)?,
            &settings.embedding_model,
        )),
        Provider::Google => EmbeddingModel::Google(GoogleEmbeddings::new(
            GoogleClient::new(settings)?,
            &settings.embedding_model,
        )),
    };
    Ok(model)
}

#[inline]
pub fn create_generator(config: &Config, temperature: f32) -> Result<ChatModel, ProviderError> {
    let settings = config.active_provider();
    info!(
        "Creating {} chat model {} (temperature {})",
        config.provider.display_name(),
        settings.chat_model,
        temperature
    );

    let model = match config.provider {
        Provider::OpenAi => ChatModel::OpenAi(OpenAiChat::new(
            OpenAiClient::new(settings)?,
            &settings.chat_model,
            temperature,
        )),
        Provider::Google => ChatModel::Google(GoogleChat::new(
            GoogleClient::new(settings)?,
            &settings.chat_model,
            temperature,
        )),
    };
    Ok(model)
}

/// Embedding and chat models of the configured provider
#[inline]
pub fn create_both(
    config: &Config,
    temperature: f32,
) -> Result<(EmbeddingModel, ChatModel), ProviderError> {
    let embedder = create_embedder(config)?;
    let generator = create_generator(config, temperature)?;
    debug!(
        "Models ready: embeddings={}, chat={}",
        embedder.model(),
        generator.model()
    );
    Ok((embedder, generator))
}

/// Run a blocking HTTP call on the blocking pool
pub(crate) async fn run_blocking<T, F>(call: F) -> Result<T, ProviderError>
where
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ProviderError::Task(e.to_string()))?
}

/// Join an endpoint path onto a base URL, keeping the base path intact
pub(crate) fn endpoint(base: &url::Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}
