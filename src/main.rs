//! # knowbase CLI
//!
//! ```bash
//! knowbase --config ./config/knowbase.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `knowbase init` | Create the SQLite database and run schema migrations |
//! | `knowbase import <file.json>` | Load chatbots and knowledge items from a seed file |
//! | `knowbase search <chatbot> "<query>"` | Rank a chatbot's knowledge for a query |
//! | `knowbase chat <chatbot> "<message>"` | Run one chat turn from the terminal |
//! | `knowbase serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use knowbase::chat::{ChatRequest, ChatService};
use knowbase::config;
use knowbase::db;
use knowbase::generation::create_client;
use knowbase::import;
use knowbase::migrate;
use knowbase::search::{self, SearchOverrides};
use knowbase::server;
use knowbase::sqlite_store::SqliteStore;

/// knowbase: knowledge-base retrieval and chat for customer-service chatbots.
#[derive(Parser)]
#[command(name = "knowbase", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/knowbase.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import chatbots and knowledge items from a JSON seed file.
    Import {
        /// Path to the seed file.
        file: PathBuf,
    },

    /// Search a chatbot's knowledge base.
    Search {
        /// Chatbot id.
        chatbot: String,

        /// The search query string.
        query: String,

        /// Maximum number of results (default from `[retrieval].search_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum relevance, exclusive (default from `[retrieval].search_threshold`).
        #[arg(long)]
        threshold: Option<f64>,

        /// Show the per-signal score breakdown.
        #[arg(long)]
        explain: bool,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Send one message to a chatbot and print the reply.
    Chat {
        /// Chatbot id.
        chatbot: String,

        /// The user message.
        message: String,

        /// Session id; reuse it to continue a conversation.
        #[arg(long, default_value = "cli")]
        session: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::Search {
            chatbot,
            query,
            limit,
            threshold,
            explain,
            json,
        } => {
            let overrides = SearchOverrides {
                limit,
                threshold,
                explain,
            };
            search::run_search(&cfg, &chatbot, &query, &overrides, json).await?;
        }
        Commands::Chat {
            chatbot,
            message,
            session,
        } => {
            let store = Arc::new(SqliteStore::new(db::connect(&cfg).await?));
            let generator = create_client(&cfg.generation)?;
            let service = ChatService::new(store.clone(), store.clone(), generator)
                .with_params(cfg.retrieval.chat_params())
                .with_history_limit(cfg.retrieval.history_limit);
            let request = ChatRequest {
                message,
                session_id: session,
                user_id: None,
            };
            let reply = service.respond(&chatbot, &request).await;
            store.close().await;
            let reply = reply?;
            println!("{}", reply.message);
            println!();
            println!(
                "(conversation {}, {} knowledge item(s) used)",
                reply.conversation_id, reply.knowledge_used
            );
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
