//! # PDF Chat CLI (`pdfchat`)
//!
//! Command-line entry point: extract and chunk PDFs, build index
//! collections, ask questions, and start the web UI.
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdfchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat init` | Create the persistence directory and index schema |
//! | `pdfchat extract <pdf>...` | Print the concatenated extracted text |
//! | `pdfchat chunk <pdf>...` | Print the chunks the text splits into |
//! | `pdfchat process <pdf>...` | Build an index collection and print its ID |
//! | `pdfchat collections` | List persisted collections |
//! | `pdfchat ask --collection <id> "<q>"` | Ask one question against a collection |
//! | `pdfchat chat <pdf>...` | Process PDFs, then chat over stdin |
//! | `pdfchat serve` | Start the web UI |
//!
//! Credentials are read from the environment (`GEMINI_API_KEY` by default);
//! a `.env` file in the working directory is loaded first.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pdf_chat::{commands, config, server};

/// PDF Chat: ask questions about your PDF documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdfchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Chat with multiple PDFs through retrieval-augmented generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pdfchat.toml`. When the file does not exist,
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/pdfchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the persistence directory and index schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Print the text extracted from the given PDFs, concatenated in order.
    Extract {
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,
    },

    /// Split the extracted text into chunks and print them.
    Chunk {
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,

        /// Emit chunks as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract, chunk, and embed PDFs into a new index collection.
    Process {
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,
    },

    /// List persisted index collections, newest first.
    Collections,

    /// Ask a single question against an existing collection.
    Ask {
        /// Collection ID printed by `pdfchat process`.
        #[arg(long)]
        collection: String,

        /// The question.
        question: String,

        /// Also print the retrieved chunks.
        #[arg(long)]
        sources: bool,
    },

    /// Process PDFs, then answer questions read from stdin, one per line.
    Chat {
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,

        /// Also print the retrieved chunks.
        #[arg(long)]
        sources: bool,
    },

    /// Start the web UI.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdf_chat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Extraction needs no configuration
    if let Commands::Extract { pdfs } = &cli.command {
        return commands::run_extract(pdfs);
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Extract { .. } => {
            // Handled above (before config loading)
        }
        Commands::Chunk { pdfs, json } => {
            commands::run_chunk(&cfg, &pdfs, json)?;
        }
        Commands::Process { pdfs } => {
            commands::run_process(&cfg, &pdfs).await?;
        }
        Commands::Collections => {
            commands::run_collections(&cfg).await?;
        }
        Commands::Ask {
            collection,
            question,
            sources,
        } => {
            commands::run_ask(&cfg, &collection, &question, sources).await?;
        }
        Commands::Chat { pdfs, sources } => {
            commands::run_chat(&cfg, &pdfs, sources).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
