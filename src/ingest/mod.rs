// Ingestion pipeline
// Loads a PDF, splits it into chunks, embeds them and stores them in the vector database

pub mod document;


use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::chunking::{ChunkStats, ChunkingConfig, DocumentChunk, TextSplitter, split_pages};
use crate::database::VectorStore;
use crate::providers::{Embedder, Provider, ProviderError};
use crate::{RagError, Result};
use document::{Page, load_pdf, validate_document_path};

/// Chunks sent to the embedder per call
const EMBED_BATCH_SIZE: usize = 64;

/// Pipeline step in which an ingestion failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Load,
    Split,
    Embed,
    Persist,
}

impl fmt::Display for IngestStage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Split => "split",
            Self::Embed => "embed",
            Self::Persist => "persist",
        })
    }
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionReport {
    pub source_path: PathBuf,
    pub file_name: String,
    pub pages: usize,
    pub chunks: usize,
    pub chunk_stats: ChunkStats,
    pub collection: String,
    pub provider: Provider,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl IngestionReport {
    /// Multi-line summary shown after a successful run
    #[inline]
    pub fn summary(&self) -> String {
        let mut out = String::new();

        // Writing into a String cannot fail
        let _ = writeln!(out, "📊 Resumo:");
        let _ = writeln!(out, "   - Arquivo: {}", self.file_name);
        let _ = writeln!(out, "   - Páginas: {}", self.pages);
        let _ = writeln!(out, "   - Chunks armazenados: {}", self.chunks);
        let _ = writeln!(
            out,
            "   - Tamanho dos chunks: média {:.0}, mínimo {}, máximo {} caracteres",
            self.chunk_stats.mean, self.chunk_stats.min, self.chunk_stats.max
        );
        let _ = writeln!(
            out,
            "   - Chunk size / overlap: {} / {}",
            self.chunk_size, self.chunk_overlap
        );
        let _ = writeln!(out, "   - Collection: {}", self.collection);
        let _ = write!(
            out,
            "   - Provider: {} ({})",
            self.provider.to_string().to_uppercase(),
            self.embedding_model
        );

        out
    }
}

pub struct Ingestor<E> {
    embedder: E,
    store: VectorStore,
    chunking: ChunkingConfig,
    provider: Provider,
}

impl<E: Embedder> Ingestor<E> {
    #[inline]
    pub fn new(
        embedder: E,
        store: VectorStore,
        chunking: ChunkingConfig,
        provider: Provider,
    ) -> Self {
        Self {
            embedder,
            store,
            chunking,
            provider,
        }
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Ingest the PDF at `path`, replacing the collection contents when `clear_existing` is set
    #[inline]
    pub async fn ingest(&self, path: &Path, clear_existing: bool) -> Result<IngestionReport> {
        let path = validate_document_path(path)?;

        info!("Loading {}", path.display());
        let load_path = path.clone();
        let pages = tokio::task::spawn_blocking(move || load_pdf(&load_path))
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("PDF loader task failed: {}", e)))
            .and_then(|loaded| loaded)
            .map_err(|e| e.during(IngestStage::Load))?;

        self.ingest_pages(&path, &pages, clear_existing).await
    }

    /// Split, embed and store pages that were already loaded
    #[inline]
    pub async fn ingest_pages(
        &self,
        source_path: &Path,
        pages: &[Page],
        clear_existing: bool,
    ) -> Result<IngestionReport> {
        let splitter =
            TextSplitter::new(self.chunking).map_err(|e| e.during(IngestStage::Split))?;
        let chunks = split_pages(pages, &splitter);
        let chunk_stats = ChunkStats::from_chunks(&chunks);
        info!(
            "Split {} page(s) into {} chunk(s) (average {:.0} characters)",
            pages.len(),
            chunks.len(),
            chunk_stats.mean
        );

        let vectors = self
            .embed_chunks(&chunks)
            .await
            .map_err(|e| e.during(IngestStage::Embed))?;

        // Embeddings are ready before anything is deleted
        if clear_existing {
            self.store
                .clear()
                .await
                .map_err(|e| e.during(IngestStage::Persist))?;
        }
        self.store
            .insert(&chunks, &vectors)
            .await
            .map_err(|e| e.during(IngestStage::Persist))?;

        let file_name = source_path.file_name().map_or_else(
            || source_path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );

        Ok(IngestionReport {
            source_path: source_path.to_path_buf(),
            file_name,
            pages: pages.len(),
            chunks: chunks.len(),
            chunk_stats,
            collection: self.store.collection().to_string(),
            provider: self.provider,
            embedding_model: self.embedder.model().to_string(),
            chunk_size: splitter.chunk_size(),
            chunk_overlap: splitter.chunk_overlap(),
        })
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
        let bar = progress_bar(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self.embedder.embed(&texts).await?;
            if embedded.len() != batch.len() {
                return Err(RagError::Provider(ProviderError::InvalidResponse(format!(
                    "embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                ))));
            }

            vectors.extend(embedded);
            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} chunks", vectors.len(), chunks.len());
        }

        bar.finish_and_clear();
        Ok(vectors)
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("[{bar:30}] {pos}/{len} Embedding chunks") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}
