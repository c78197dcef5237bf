//! # Projects Tracker CLI (`tracker`)
//!
//! The `tracker` binary lists project documents and forwards questions
//! about them to the managed knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! tracker --config ./config/tracker.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tracker catalog` | List documents found in the bucket |
//! | `tracker ask "<question>"` | Ask one question |
//! | `tracker workflow --document <key> --option <label>` | Ask a templated workflow question |
//! | `tracker chat` | Interactive chat session |
//! | `tracker serve` | Start the HTTP server |
//!
//! Diagnostics go to stderr and are filtered with `RUST_LOG`
//! (default `warn`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use projects_tracker::aws::AwsCredentials;
use projects_tracker::bedrock::BedrockKnowledgeBase;
use projects_tracker::config::{self, Config};
use projects_tracker::controller::Controller;
use projects_tracker::models::ChatMessage;
use projects_tracker::render;
use projects_tracker::s3::S3Client;
use projects_tracker::session::SessionState;
use projects_tracker::{chat, server};

/// Projects Tracker: ask questions about project documents and get answers
/// with a citation back to the source.
#[derive(Parser)]
#[command(
    name = "tracker",
    about = "Projects Tracker: question answering over project documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tracker.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/tracker.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the project documents in the bucket.
    ///
    /// Only keys named `<company>_<city>.<ext>` are shown.
    Catalog,

    /// Ask one question and print the answer with its source.
    Ask {
        /// The question, forwarded verbatim.
        question: String,

        /// Also print the excerpt that supported the answer.
        #[arg(long)]
        show_context: bool,
    },

    /// Ask the templated question for a document and workflow option.
    Workflow {
        /// Full object key of the document (e.g. `Acme_Berlin.pdf`).
        #[arg(long)]
        document: String,

        /// Workflow option (e.g. `"Key contacts"`).
        #[arg(long)]
        option: String,

        #[arg(long)]
        show_context: bool,
    },

    /// Start an interactive chat session.
    Chat {
        #[arg(long)]
        show_context: bool,
    },

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_controller(cfg: &Config) -> Result<Controller> {
    let creds = AwsCredentials::from_env()?;
    let store = Arc::new(S3Client::new(cfg, creds.clone()));
    let knowledge_base = Arc::new(BedrockKnowledgeBase::new(cfg, creds)?);
    Ok(Controller::from_config(cfg, store, knowledge_base))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let controller = build_controller(&cfg)?;

    match cli.command {
        Commands::Catalog => {
            let documents = controller.documents().await?;
            print!("{}", render::render_documents(&documents));
        }
        Commands::Ask {
            question,
            show_context,
        } => {
            let mut session = SessionState::new();
            let turn = controller.ask(&mut session, &question).await?;
            println!("{}", render::render_turn(&turn, show_context));
        }
        Commands::Workflow {
            document,
            option,
            show_context,
        } => {
            let mut session = SessionState::new();
            controller.select_document(&mut session, &document).await?;
            controller.select_workflow(&mut session, &option)?;
            let turn = controller.run_workflow(&mut session).await?;
            println!(
                "{}",
                render::render_message(&ChatMessage::user(turn.question.clone()))
            );
            println!("{}", render::render_turn(&turn, show_context));
        }
        Commands::Chat { show_context } => {
            chat::run_chat(&controller, show_context).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg, controller).await?;
        }
    }

    Ok(())
}
