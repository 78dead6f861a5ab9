//! # Ayla CLI (`ayla`)
//!
//! The `ayla` binary starts the chat web service and manages its local
//! knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! ayla --config ./ayla.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ayla serve` | Start the chat web service |
//! | `ayla reindex` | Rebuild the knowledge base from the configured documents |
//! | `ayla ask "<message>"` | Run one message through the full pipeline and print the reply |
//!
//! ## Environment
//!
//! `GEMINI_API_KEY` must be set (directly or through a `.env` file) for
//! generation and retrieval to work. Without it the server still starts and
//! answers every chat with a fixed no-connection reply.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ayla::chat::ChatService;
use ayla::config::{self, Config};
use ayla::db;
use ayla::embedding::GeminiEmbedder;
use ayla::genai::{GeminiApi, GenerationApi, TokioDelay};
use ayla::history::DEFAULT_SESSION;
use ayla::index::{self, PassageIndex};
use ayla::ingest;
use ayla::migrate;
use ayla::server;

/// Ayla — a retrieval-augmented chat companion backed by the Gemini API.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every setting has a default, so the flag is optional; see
/// `ayla.example.toml` for the full list.
#[derive(Parser)]
#[command(
    name = "ayla",
    about = "Ayla — a retrieval-augmented chat companion service",
    version,
    long_about = "Ayla serves a small chat web app that forwards messages to the Gemini \
    generation API, optionally enriching prompts with passages retrieved from a local \
    SQLite knowledge base built out of your own documents."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./ayla.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the chat web service.
    ///
    /// Loads (or builds) the knowledge base, connects the generation client,
    /// and serves the chat page, `/health`, and `/chat` on `[server].bind`.
    Serve,

    /// Rebuild the knowledge base from scratch.
    ///
    /// Clears every stored document, passage, and vector, then re-extracts,
    /// re-chunks, and re-embeds the documents listed under
    /// `[knowledge].documents`. Requires `GEMINI_API_KEY`.
    Reindex,

    /// Run one message through the full chat pipeline and print the reply.
    ///
    /// Uses the same retrieval gate, prompt, and retry policy as the server.
    /// Handy for smoke-testing a deployment from the shell.
    Ask {
        /// The message to send.
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let chat = build_service(&cfg).await?;
            print_banner(&cfg, &chat);
            server::run_server(&cfg, Arc::new(chat)).await?;
        }
        Commands::Reindex => {
            run_reindex(&cfg).await?;
        }
        Commands::Ask { message } => {
            let chat = build_service(&cfg).await?;
            let reply = chat.respond(DEFAULT_SESSION, &message).await;
            println!("{}", reply);
        }
    }

    Ok(())
}

/// Reads the API key from the environment.
fn api_key_from_env() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

/// Wires up the chat pipeline, degrading to offline mode without a key.
async fn build_service(cfg: &Config) -> Result<ChatService> {
    let Some(api_key) = api_key_from_env() else {
        println!("❌ GEMINI_API_KEY bulunamadı. .env dosyanızı kontrol edin.");
        return Ok(ChatService::new(cfg.clone(), None, Arc::new(TokioDelay), None));
    };

    let api: Arc<dyn GenerationApi> = Arc::new(GeminiApi::new(api_key.clone(), &cfg.generation)?);
    println!("✓ Gemini istemcisi hazır");

    let embedder = Arc::new(GeminiEmbedder::new(api_key, &cfg.embedding)?);
    let index: Option<Arc<dyn PassageIndex>> = index::open_or_build(cfg, embedder).await;
    if index.is_some() {
        println!("✓ Psikoloji bilgi bankası yüklendi");
    }

    Ok(ChatService::new(
        cfg.clone(),
        Some(api),
        Arc::new(TokioDelay),
        index,
    ))
}

fn print_banner(cfg: &Config, chat: &ChatService) {
    let mode = if chat.rag_enabled() {
        "Tam Özellikli"
    } else {
        "Sohbet Modu"
    };
    println!("{}", "=".repeat(70));
    println!("💜 AYLA AI - SOHBET ASİSTANI");
    println!("{}", "=".repeat(70));
    println!("✓ Mod: {}", mode);
    println!("✓ Model: {}", cfg.generation.model);
    println!("✓ Adres: http://{}", cfg.server.bind);
    println!("{}", "=".repeat(70));
}

/// Clears and rebuilds the knowledge base, then prints a summary.
async fn run_reindex(cfg: &Config) -> Result<()> {
    let Some(api_key) = api_key_from_env() else {
        bail!("GEMINI_API_KEY is not set. Reindexing needs it to embed passages.");
    };

    let embedder = GeminiEmbedder::new(api_key, &cfg.embedding)?;
    let pool = db::connect(&cfg.knowledge.db_path).await?;
    migrate::run_migrations(&pool).await?;

    ingest::clear_knowledge_base(&pool).await?;
    println!("reindex — cleared existing knowledge base");

    let report = ingest::build_knowledge_base(cfg, &pool, &embedder).await?;
    pool.close().await;

    println!("reindex");
    println!("  documents indexed: {}", report.documents_indexed);
    println!("  documents skipped: {}", report.documents_skipped);
    println!("  passages indexed: {}", report.passages_indexed);

    Ok(())
}
