use std::io::{BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use console::{Term, style};
use tracing::{info, warn};

use crate::RagError;
use crate::chat::{ChatShell, SessionEnd, spawn_line_reader};
use crate::config::Config;
use crate::database::VectorStore;
use crate::ingest::{IngestionReport, Ingestor};
use crate::providers::{DEFAULT_TEMPERATURE, create_both, create_embedder, provider_info};
use crate::search::{SearchService, VectorRetriever};

const RULE: &str = "============================================================";

/// Completes when the user presses Ctrl+C; never completes if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Ingest `path` (or the configured default document) into the configured collection
#[inline]
pub async fn run_ingest(
    config: &Config,
    path: Option<PathBuf>,
    clear: bool,
) -> Result<IngestionReport> {
    let path = path.unwrap_or_else(|| config.document_path.clone());

    println!("\n{}", RULE);
    println!("{}", style("📄 INGESTÃO DE PDF").bold().cyan());
    println!("{}", RULE);
    println!("   - Arquivo: {}", path.display());
    println!("   - Provider: {}", config.provider.display_name());
    println!("   - Collection: {}", config.collection);
    if clear {
        println!("   - {}", style("A collection existente será substituída").yellow());
    }
    println!("{}\n", RULE);

    let embedder = create_embedder(config).context("Failed to create embedding model")?;
    let store = VectorStore::connect(&config.storage, &config.collection).await?;
    let ingestor = Ingestor::new(embedder, store, config.chunking, config.provider);

    let report = ingestor.ingest(&path, clear).await?;
    info!(
        "Ingested {} into {} ({} chunks)",
        report.file_name, report.collection, report.chunks
    );

    println!("\n{}", RULE);
    println!("{}", style("✅ INGESTÃO CONCLUÍDA COM SUCESSO!").bold().green());
    println!("{}", RULE);
    println!("{}", report.summary());
    println!("{}\n", RULE);

    Ok(report)
}

/// Start the chat shell, or answer `query` once and return
#[inline]
pub async fn run_chat(config: &Config, query: Option<String>) -> Result<SessionEnd> {
    let (embedder, generator) =
        create_both(config, DEFAULT_TEMPERATURE).context("Failed to create models")?;
    let store = VectorStore::connect(&config.storage, &config.collection).await?;

    if !store.collection_exists().await? {
        warn!(
            "Collection {} does not exist yet; run `pdf-rag ingest` first",
            config.collection
        );
    }

    let service = SearchService::new(
        VectorRetriever::new(embedder, store),
        generator,
        config.search_k,
    );
    let mut shell = ChatShell::new(service, config.clone());
    let terminal = Term::stdout();
    if terminal.is_term() {
        shell = shell.with_terminal(terminal);
    }
    let mut stdout = std::io::stdout();

    let interrupt = ctrl_c();
    tokio::pin!(interrupt);
    // First poll installs the SIGINT handler before anything is printed
    if futures::poll!(&mut interrupt).is_ready() {
        return Ok(SessionEnd::Interrupted);
    }

    if let Some(question) = query {
        tokio::select! {
            answer = shell.ask_once(&question, &mut stdout) => {
                answer?;
                Ok(SessionEnd::Exit)
            }
            () = &mut interrupt => {
                println!("\n\n👋 Programa interrompido.");
                Ok(SessionEnd::Interrupted)
            }
        }
    } else {
        let lines = spawn_line_reader(BufReader::new(std::io::stdin()))
            .context("Failed to start reading input")?;
        let end = shell.run(lines, &mut stdout, interrupt).await?;
        stdout.flush()?;
        Ok(end)
    }
}

/// Report storage health and collection statistics
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let provider = provider_info(config);

    println!("{}", style("📊 PDF-RAG Status Report").bold().cyan());
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Provider:");
    println!("   {} ({})", provider.name, provider.provider);
    println!("   📋 Embedding Model: {}", provider.embedding_model);
    println!("   💬 Chat Model: {}", provider.chat_model);
    println!("   🔑 API Key: {}", provider.masked_key);
    println!();

    println!("🔍 Vector Database Status:");
    let store = match VectorStore::connect(&config.storage, &config.collection).await {
        Ok(store) => store,
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {}", e);
            return Err(e.into());
        }
    };

    match store.health_check().await {
        Ok(collections) => println!(
            "   ✅ LanceDB: Connected ({}, {} collection(s))",
            config.storage, collections
        ),
        Err(e) => {
            println!("   ❌ LanceDB: Unhealthy - {}", e);
            return Err(e.into());
        }
    }

    let stats = store.collection_stats().await?;
    println!();
    println!("📚 Collection '{}':", stats.collection);
    if stats.exists {
        println!("   Total chunks: {}", stats.total_chunks);
    } else {
        println!("   Not created yet. Run `pdf-rag ingest <file.pdf>` to populate it.");
    }

    Ok(())
}

/// Print a failed ingestion with hints for the likely causes
#[inline]
pub fn print_ingest_failure(error: &anyhow::Error) {
    if let Some(RagError::FileNotFound(_) | RagError::InvalidInput(_)) =
        error.downcast_ref::<RagError>()
    {
        eprintln!("\n{} {}\n", style("❌ Erro:").red().bold(), error);
        return;
    }

    eprintln!("\n{} {:#}\n", style("❌ Erro durante ingestão:").red().bold(), error);
    eprintln!("💡 Verifique:");
    eprintln!("   1. Se o banco de dados está acessível (DATABASE_URL)");
    eprintln!("   2. Se a API key está configurada corretamente");
    eprintln!("   3. Se o arquivo PDF não está corrompido");
    eprintln!("   4. Use --debug para mais detalhes\n");
}

/// Print a fatal chat start-up error with hints for the likely causes
#[inline]
pub fn print_chat_failure(error: &anyhow::Error) {
    eprintln!("\n{} {:#}", style("❌ Erro fatal:").red().bold(), error);
    eprintln!("💡 Verifique:");
    eprintln!("   1. Se o banco de dados está acessível (DATABASE_URL)");
    eprintln!("   2. Se a ingestão foi executada (pdf-rag ingest)");
    eprintln!("   3. Se as variáveis de ambiente estão configuradas (.env)");
    eprintln!("   4. Use --debug para mais detalhes\n");
}
