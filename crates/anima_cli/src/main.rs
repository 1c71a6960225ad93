use anima_core::{AnimaConfig, DurableStore, Expression, JsonFileStore, MemoryStore, Utterance, UtteranceKind};
use anima_reasoning::{build_reasoner, ControlLoop, Organism};
use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "anima.toml")]
    config: PathBuf,

    /// Directory holding the persisted subsystems
    #[arg(short, long, env = "ANIMA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Reasoner provider ("ollama" or "mock")
    #[arg(long)]
    provider: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing is written to disk
    #[arg(long)]
    ephemeral: bool,
}

/// Prints utterances to the terminal.
struct ConsoleExpression;

#[async_trait]
impl Expression for ConsoleExpression {
    async fn speak(&self, utterance: &Utterance) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match utterance.kind {
            UtteranceKind::Reply => writeln!(out, "\nAnima: {}\n", utterance.text)?,
            UtteranceKind::Autonomous => writeln!(out, "\n(Anima, unprompted) {}\n", utterance.text)?,
            UtteranceKind::Notice => writeln!(out, "[{}]", utterance.text)?,
        }
        write!(out, "> ")?;
        out.flush()?;
        Ok(())
    }
}

fn init_logging(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "anima.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
            None
        }
    }
}

/// Blocks on stdin in its own thread. End of input is treated as `exit`.
fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                return;
            }
        }
        let _ = tx.blocking_send("exit".to_string());
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let _log_guard = init_logging(args.log_dir.as_ref());

    let mut config = AnimaConfig::load_or_default(&args.config);
    if let Some(dir) = args.data_dir {
        config.organism.data_dir = dir;
    }
    if let Some(provider) = args.provider {
        config.reasoner.provider = provider;
    }
    if let Some(model) = args.model {
        config.reasoner.model = model;
    }

    info!("Initializing Anima...");
    let store: Arc<dyn DurableStore> = if args.ephemeral {
        info!("Ephemeral mode: state will not be persisted");
        Arc::new(MemoryStore::new())
    } else {
        info!("Opening store at {}", config.organism.data_dir.display());
        Arc::new(JsonFileStore::open(&config.organism.data_dir).with_context(|| {
            format!("Failed to open data dir {}", config.organism.data_dir.display())
        })?)
    };

    let reasoner = build_reasoner(&config.reasoner)?;
    info!("Reasoner: {} ({})", reasoner.name(), config.reasoner.model);

    let organism = Organism::open(store, &config);
    println!("Anima is awake. {}", organism.state.status());
    println!("Type 'sleep' to rest, 'exit' or 'quit' to leave.");
    print!("> ");
    io::stdout().flush()?;

    let (tx, rx) = mpsc::channel(config.organism.input_queue_capacity.max(1));
    spawn_stdin_reader(tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send("exit".to_string()).await;
        }
    });

    let expression: Arc<dyn Expression> = Arc::new(ConsoleExpression);
    ControlLoop::new(organism, reasoner, expression, &config, chrono::Utc::now())
        .run(rx)
        .await
}
