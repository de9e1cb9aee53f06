//! # Folio CLI (`folio`)
//!
//! Runs the portfolio assistant locally: chat with it from the terminal,
//! serve it over HTTP, inspect its documents, and review what visitors
//! asked and left behind.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio init` | Create the SQLite database and run schema migrations |
//! | `folio chat` | Talk to the assistant (one-shot or interactive) |
//! | `folio serve` | Start the HTTP API |
//! | `folio documents list\|stats\|search\|add` | Inspect or extend the profile documents |
//! | `folio analytics` | Activity summary |
//! | `folio contacts` | Captured contacts |
//! | `folio questions` | Questions the assistant could not answer |
//!
//! `chat` and `serve` need `OPENAI_API_KEY`; a `.env` file in the working
//! directory is read if present. Logs go to stderr and honour `RUST_LOG`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

use folio::analytics::{self, format_ts_relative};
use folio::config::{self, Config, Secrets};
use folio::documents::DocumentStore;
use folio::engine::{self, ConversationEngine, EngineParts};
use folio::llm::{ChatModel, OpenAiChatModel};
use folio::notify::Notifier;
use folio::server;
use folio::store::Store;

/// How long `chat` waits for contact notifications before exiting.
const NOTIFY_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Folio: a portfolio assistant backed by local documents and SQLite.
#[derive(Parser)]
#[command(name = "folio", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    Init,

    /// Chat with the assistant.
    ///
    /// With `--message`, prints one reply and exits. Otherwise reads
    /// messages from stdin, one per line, until EOF.
    Chat {
        /// Continue an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,

        /// Send a single message.
        #[arg(long)]
        message: Option<String>,
    },

    /// Start the HTTP API on the configured bind address.
    Serve,

    /// Inspect or extend the profile documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Summarize recent activity.
    Analytics {
        /// Size of the reporting window.
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// List the most recently captured contacts.
    Contacts {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// List the most recent questions the assistant could not answer.
    Questions {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// List loaded documents with their summaries.
    List,
    /// Counts by file type and extraction failures.
    Stats,
    /// Keyword search across the documents.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,
    },
    /// Copy a file into the documents directory and process it.
    Add { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = Store::open(&cfg).await?;
            store.close().await;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Chat { session, message } => {
            let engine = build_engine(&cfg).await?;
            let session_id = match session {
                Some(id) => {
                    engine::validate_session_id(&id)?;
                    let resumed = engine.store().touch_session(&id).await?;
                    tracing::info!(
                        session = %id,
                        messages = resumed.message_count,
                        "resuming chat session"
                    );
                    id
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    tracing::info!(session = %id, "new chat session");
                    id
                }
            };

            let outcome = match message {
                Some(text) => {
                    println!("{}", engine.handle_message(&session_id, &text).await);
                    Ok(())
                }
                None => run_interactive(&engine, &session_id, &cfg.persona.name).await,
            };
            // contact notifications are delivered on background tasks
            engine.flush_notifications(NOTIFY_FLUSH_TIMEOUT).await;
            engine.store().close().await;
            outcome?;
        }
        Commands::Serve => {
            let bind = cfg.server.bind.clone();
            let engine = build_engine(&cfg).await?;
            server::run_server(Arc::new(engine), &bind).await?;
        }
        Commands::Documents { action } => run_documents(&cfg, action).await?,
        Commands::Analytics { days } => {
            if days == 0 {
                anyhow::bail!("--days must be at least 1");
            }
            let store = Store::open(&cfg).await?;
            let summary = analytics::summary(&store, days).await?;
            print!("{}", analytics::render(&summary));
        }
        Commands::Contacts { limit } => {
            let store = Store::open(&cfg).await?;
            print_contacts(&store, limit).await?;
        }
        Commands::Questions { limit } => {
            let store = Store::open(&cfg).await?;
            print_questions(&store, limit).await?;
        }
    }

    Ok(())
}

/// Open the database, load documents, and wire up the model and notifier.
async fn build_engine(cfg: &Config) -> anyhow::Result<ConversationEngine> {
    let secrets = Secrets::from_env().context("the assistant needs model credentials")?;
    let model = Arc::new(
        OpenAiChatModel::new(&cfg.model, secrets.openai_api_key.clone())
            .context("failed to build model client")?,
    );

    let store = Store::open(cfg).await?;
    let insights: Option<&dyn ChatModel> = if cfg.documents.ai_insights {
        Some(model.as_ref())
    } else {
        None
    };
    let documents = DocumentStore::load(&cfg.documents, insights).await?;
    documents.sync_metadata(&store).await?;

    let notifier = Notifier::new(&cfg.notify, secrets.pushover);

    Ok(ConversationEngine::new(EngineParts {
        store,
        documents: Arc::new(documents),
        model,
        notifier,
        config: cfg.clone(),
    }))
}

async fn run_interactive(
    engine: &ConversationEngine,
    session_id: &str,
    persona: &str,
) -> anyhow::Result<()> {
    eprintln!("Chatting on behalf of {}. Ctrl-D to quit.", persona);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        std::io::stderr().flush().ok();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = engine.handle_message(session_id, &line).await;
        println!("{}\n", reply);
    }
    Ok(())
}

async fn run_documents(cfg: &Config, action: DocumentsAction) -> anyhow::Result<()> {
    match action {
        DocumentsAction::List => {
            let documents = DocumentStore::load(&cfg.documents, None).await?;
            if documents.is_empty() {
                println!("No documents in {}", cfg.documents.dir.display());
            }
            for doc in documents.records() {
                println!(
                    "{:<32} {:<5} {:>8} chars",
                    doc.filename,
                    doc.file_type,
                    doc.content_length()
                );
                if !doc.summary.is_empty() {
                    println!("    {}", doc.summary);
                }
                if !doc.keywords.is_empty() {
                    println!("    keywords: {}", doc.keywords.join(", "));
                }
            }
            print_failures(&documents);
        }
        DocumentsAction::Stats => {
            let documents = DocumentStore::load(&cfg.documents, None).await?;
            let stats = documents.stats();
            println!("Folio Documents");
            println!("===============");
            println!();
            println!("  Directory:   {}", cfg.documents.dir.display());
            println!("  Total:       {}", stats.total);
            println!("  Processed:   {}", stats.processed);
            println!("  Failed:      {}", stats.failed);
            println!("  Characters:  {}", stats.total_chars);
            println!("  Average:     {:.0}", stats.average_chars);
            if !stats.by_file_type.is_empty() {
                println!();
                println!("  {:<8} {:>6}", "TYPE", "FILES");
                println!("  {}", "-".repeat(15));
                for (file_type, count) in &stats.by_file_type {
                    println!("  {:<8} {:>6}", file_type, count);
                }
            }
            print_failures(&documents);
        }
        DocumentsAction::Search { query, limit } => {
            let documents = DocumentStore::load(&cfg.documents, None).await?;
            let hits = documents.search(&query, limit.unwrap_or(cfg.documents.search_limit));
            if hits.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.2}] {} (matched in: {})",
                    i + 1,
                    hit.score,
                    hit.filename,
                    hit.matched_in.join(", ")
                );
                println!("    {}", hit.snippet);
            }
        }
        DocumentsAction::Add { path } => add_document(cfg, &path).await?,
    }
    Ok(())
}

async fn add_document(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    let model = if cfg.documents.ai_insights {
        let secrets = Secrets::from_env().context("ai_insights is enabled")?;
        Some(OpenAiChatModel::new(&cfg.model, secrets.openai_api_key)?)
    } else {
        None
    };

    let store = Store::open(cfg).await?;
    let mut documents = DocumentStore::load(&cfg.documents, None).await?;
    let record = documents
        .add_file(path, model.as_ref().map(|m| m as &dyn ChatModel))
        .await
        .with_context(|| format!("failed to add {}", path.display()))?;
    store.upsert_document(&record).await?;

    println!(
        "Added {} ({} chars) to {}",
        record.filename,
        record.content_length(),
        cfg.documents.dir.display()
    );
    println!("    {}", record.summary);
    Ok(())
}

fn print_failures(documents: &DocumentStore) {
    if documents.failures().is_empty() {
        return;
    }
    println!();
    println!("  Failed to process:");
    for failure in documents.failures() {
        println!("  {:<32} {}", failure.filename, failure.error);
    }
}

async fn print_contacts(store: &Store, limit: i64) -> anyhow::Result<()> {
    let total = store.contact_count().await?;
    let contacts = store.recent_contacts(limit).await?;

    println!("Contacts ({} total)", total);
    println!();
    if contacts.is_empty() {
        println!("  No contacts captured yet.");
        return Ok(());
    }
    println!(
        "  {:<16} {:<24} {:<30} {:<20} {}",
        "CAPTURED", "NAME", "EMAIL", "COMPANY", "INTEREST"
    );
    println!("  {}", "-".repeat(100));
    for c in &contacts {
        println!(
            "  {:<16} {:<24} {:<30} {:<20} {}",
            format_ts_relative(c.captured_at),
            c.name,
            c.email,
            c.company.as_deref().unwrap_or("-"),
            c.interest_level.as_str()
        );
        if let Some(notes) = &c.notes {
            println!("  {:<16} {}", "", notes);
        }
    }
    Ok(())
}

async fn print_questions(store: &Store, limit: i64) -> anyhow::Result<()> {
    let questions = store.recent_unknown_questions(limit).await?;
    if questions.is_empty() {
        println!("No unanswered questions.");
        return Ok(());
    }
    println!("  {:<16} {}", "ASKED", "QUESTION");
    println!("  {}", "-".repeat(60));
    for q in &questions {
        println!("  {:<16} {}", format_ts_relative(q.asked_at), q.question_text);
    }
    Ok(())
}
