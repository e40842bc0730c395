use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use pdf_rag::commands::{
    print_chat_failure, print_ingest_failure, run_chat, run_ingest, show_status,
};
use pdf_rag::config::{Config, DEFAULT_LOG_LEVEL, EnvFile, show_config};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Ask questions about a PDF document using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a PDF, split it into chunks and store their embeddings
    Ingest {
        /// PDF to ingest; defaults to PDF_PATH
        path: Option<PathBuf>,
        /// Delete the existing collection before storing the new chunks
        #[arg(long)]
        clear: bool,
        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },
    /// Chat with the ingested document
    Chat {
        /// Answer a single question and exit
        #[arg(short, long)]
        query: Option<String>,
        /// Enable debug logging
        #[arg(short, long)]
        debug: bool,
    },
    /// Show the current configuration with secrets masked
    Config,
    /// Show vector database health and collection statistics
    Status,
}

impl Commands {
    fn debug(&self) -> bool {
        match self {
            Self::Ingest { debug, .. } | Self::Chat { debug, .. } => *debug,
            Self::Config | Self::Status => false,
        }
    }
}

/// `RUST_LOG` wins, then `--debug`, then `LOG_LEVEL`
fn log_filter(rust_log: Option<&str>, debug: bool, log_level: &str) -> EnvFilter {
    if let Some(directives) = rust_log.filter(|value| !value.trim().is_empty()) {
        return EnvFilter::new(directives);
    }
    let level = if debug { "debug" } else { log_level };
    EnvFilter::new(format!("warn,pdf_rag={level}"))
}

fn init_tracing(debug: bool, log_level: &str) {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref(), debug, log_level))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_file = EnvFile::load();
    let config = Config::resolve();
    let log_level = config
        .as_ref()
        .map_or(DEFAULT_LOG_LEVEL, |config| config.log_level.as_str());
    init_tracing(cli.command.debug(), log_level);
    env_file.log();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n{} {}", style("❌ Erro de configuração:").red().bold(), e);
            eprintln!("💡 Verifique as variáveis de ambiente (.env)\n");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("\n{} {}", style("❌ Erro:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(dispatch(cli.command, &config));
    // Provider calls abandoned by Ctrl+C are still running on the blocking pool
    runtime.shutdown_background();
    code
}

async fn dispatch(command: Commands, config: &Config) -> ExitCode {
    match command {
        Commands::Ingest { path, clear, .. } => match run_ingest(config, path, clear).await {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                print_ingest_failure(&e);
                ExitCode::FAILURE
            }
        },
        Commands::Chat { query, .. } => match run_chat(config, query).await {
            Ok(end) => {
                debug!("Chat session ended: {:?}", end);
                ExitCode::SUCCESS
            }
            Err(e) => {
                print_chat_failure(&e);
                ExitCode::FAILURE
            }
        },
        Commands::Config => {
            show_config(config);
            ExitCode::SUCCESS
        }
        Commands::Status => match show_status(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("\n{} {:#}", style("❌ Erro:").red().bold(), e);
                ExitCode::FAILURE
            }
        },
    }
}
