use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::ingest::IngestStage;
use crate::providers::ProviderError;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ingestion failed during the {stage} step: {source}")]
    Ingestion {
        stage: IngestStage,
        #[source]
        source: Box<RagError>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Attach the ingestion step that produced this error
    #[inline]
    #[must_use]
    pub fn during(self, stage: IngestStage) -> Self {
        Self::Ingestion {
            stage,
            source: Box::new(self),
        }
    }
}

pub mod chat;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod database;
pub mod ingest;
pub mod providers;
pub mod search;
