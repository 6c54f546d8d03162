//! Muhasibi CLI: ask questions against a framework snapshot.
//!
//! Usage:
//!   muhasibi ask "ما هي ركائز الحياة الطيبة الخمس؟" --db framework.db
//!   muhasibi feedback <request-id> --rating 1 --db framework.db
//!
//! Without a configured model provider the engine runs fully
//! deterministic: structural answers, evidence-verbatim fallbacks, and
//! refusals.

use clap::{Parser, Subcommand};
use muhasibi::{AskRequest, Engine, EngineConfig, Mode, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "muhasibi", version, about = "Evidence-only Arabic QA engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question
    Ask {
        /// The question, in Arabic
        question: String,
        /// Path to the SQLite framework snapshot
        #[arg(long)]
        db: PathBuf,
        /// Answer mode (answer, debate, socratic, judge, natural_chat)
        #[arg(long, default_value = "answer")]
        mode: String,
        /// Print the state trace after the answer
        #[arg(long)]
        trace: bool,
    },
    /// Record feedback for a previous request
    Feedback {
        /// Request id returned by `ask`
        request_id: String,
        /// Rating: -1, 0 or 1
        #[arg(long, allow_hyphen_values = true)]
        rating: i8,
        /// Optional tags
        #[arg(long)]
        tag: Vec<String>,
        /// Optional comment
        #[arg(long)]
        comment: Option<String>,
        /// Path to the SQLite framework snapshot
        #[arg(long)]
        db: PathBuf,
    },
}

fn open_engine(db: &PathBuf) -> Result<Engine, String> {
    let store =
        Arc::new(SqliteStore::open(db).map_err(|e| format!("failed to open database: {e}"))?);
    let catalog = Arc::new(
        store
            .load_catalog()
            .map_err(|e| format!("failed to load catalog: {e}"))?,
    );
    Ok(Engine::new(catalog, store.clone(), None, EngineConfig::from_env())
        .with_run_store(store))
}

async fn cmd_ask(db: PathBuf, question: String, mode: String, show_trace: bool) -> i32 {
    let engine = match open_engine(&db) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };
    let mode: Mode = match mode.parse() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("error: {e}");
            return 2;
        }
    };

    let result = engine
        .ask(AskRequest::new(question).with_mode(mode))
        .await;

    match serde_json::to_string_pretty(&result.response) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    }
    eprintln!("request_id: {}", result.request_id);

    if show_trace {
        if let Some(bundle) = engine.trace_bundle(&result.request_id) {
            eprintln!("{}", muhasibi::trace::render_trace(&bundle));
        }
    }
    0
}

async fn cmd_feedback(
    db: PathBuf,
    request_id: String,
    rating: i8,
    tags: Vec<String>,
    comment: Option<String>,
) -> i32 {
    let engine = match open_engine(&db) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };
    let request_id = match Uuid::parse_str(&request_id) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("error: invalid request id: {e}");
            return 2;
        }
    };
    match engine.feedback(request_id, rating, tags, comment).await {
        Ok(()) => {
            println!("recorded");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Ask {
            question,
            db,
            mode,
            trace,
        } => cmd_ask(db, question, mode, trace).await,
        Commands::Feedback {
            request_id,
            rating,
            tag,
            comment,
            db,
        } => cmd_feedback(db, request_id, rating, tag, comment).await,
    };
    std::process::exit(code);
}
