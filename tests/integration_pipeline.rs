#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingestion and answering against a temporary LanceDB directory
// with deterministic in-process models

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pdf_rag::chunking::ChunkingConfig;
use pdf_rag::config::StorageUrl;
use pdf_rag::database::VectorStore;
use pdf_rag::ingest::Ingestor;
use pdf_rag::ingest::document::Page;
use pdf_rag::providers::{Embedder, Generator, Provider, ProviderError};
use pdf_rag::search::{Answer, REFUSAL_MESSAGE, SearchService, VectorRetriever};
use tempfile::TempDir;

const TOPICS: [&str; 3] = ["receita", "férias", "segurança"];

/// One dimension per known topic plus a constant, so unrelated text stays far away
struct TopicEmbedder;

fn topic_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = TOPICS
        .iter()
        .map(|topic| if lower.contains(topic) { 1.0 } else { 0.0 })
        .collect();
    vector.push(0.1);
    vector
}

#[async_trait]
impl Embedder for TopicEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| topic_vector(text)).collect())
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(topic_vector(text))
    }

    fn model(&self) -> &str {
        "topic-embedder"
    }
}

/// Echoes the first context line of the prompt
#[derive(Default)]
struct EchoGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context_line = prompt.lines().nth(1).unwrap_or_default();
        Ok(format!("  {context_line}  "))
    }

    fn model(&self) -> &str {
        "echo"
    }
}

fn manual_pages() -> Vec<Page> {
    [
        "A receita anual da empresa foi de 10 milhões de reais.",
        "Cada colaborador tem direito a 30 dias de férias por ano.",
        "As normas de segurança exigem capacete na fábrica.",
    ]
    .iter()
    .zip(1..)
    .map(|(text, number)| Page {
        number,
        text: (*text).to_string(),
        source: "manual.pdf".to_string(),
    })
    .collect()
}

async fn store(temp_dir: &TempDir) -> VectorStore {
    VectorStore::connect(&StorageUrl::local(temp_dir.path()), "manual")
        .await
        .expect("should connect to LanceDB")
}

async fn ingest(temp_dir: &TempDir, pages: &[Page], clear: bool) -> usize {
    let ingestor = Ingestor::new(
        TopicEmbedder,
        store(temp_dir).await,
        ChunkingConfig {
            chunk_size: 200,
            chunk_overlap: 20,
        },
        Provider::OpenAi,
    );
    ingestor
        .ingest_pages(Path::new("manual.pdf"), pages, clear)
        .await
        .expect("ingestion should succeed")
        .chunks
}

#[tokio::test]
async fn ingested_document_answers_questions() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    assert_eq!(ingest(&temp_dir, &manual_pages(), false).await, 3);

    let service = SearchService::new(
        VectorRetriever::new(TopicEmbedder, store(&temp_dir).await),
        EchoGenerator::default(),
        1,
    );

    let top = service
        .search_with_scores("Quantos dias de férias eu tenho?", None)
        .await
        .expect("search should succeed");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].chunk.page, 2);
    assert_eq!(top[0].chunk.source, "manual.pdf");

    let answer = service
        .answer("Qual foi a receita anual?", None)
        .await;
    assert_eq!(answer, "A receita anual da empresa foi de 10 milhões de reais.");
    assert_eq!(service.generator().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_collection_refuses_without_generating() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let service = SearchService::new(
        VectorRetriever::new(TopicEmbedder, store(&temp_dir).await),
        EchoGenerator::default(),
        5,
    );

    let answer = service.answer_detailed("Qual é a capital da França?", None).await;

    assert_eq!(answer, Answer::Refusal);
    assert_eq!(answer.into_text(), REFUSAL_MESSAGE);
    assert_eq!(service.generator().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reingesting_appends_unless_cleared() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    ingest(&temp_dir, &manual_pages(), false).await;
    ingest(&temp_dir, &manual_pages(), false).await;
    let stats = store(&temp_dir)
        .await
        .collection_stats()
        .await
        .expect("should read stats");
    assert!(stats.exists);
    assert_eq!(stats.total_chunks, 6);

    ingest(&temp_dir, &manual_pages()[..1], true).await;
    assert_eq!(
        store(&temp_dir).await.count().await.expect("should count"),
        1
    );
}

#[tokio::test]
async fn search_never_returns_more_than_k() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    ingest(&temp_dir, &manual_pages(), false).await;
    let service = SearchService::new(
        VectorRetriever::new(TopicEmbedder, store(&temp_dir).await),
        EchoGenerator::default(),
        10,
    );

    let all = service
        .search("segurança", None)
        .await
        .expect("search should succeed");
    let two = service
        .search("segurança", Some(2))
        .await
        .expect("search should succeed");

    assert_eq!(all.len(), 3);
    assert_eq!(two.len(), 2);
    assert_eq!(all[0].page, 3);
}
