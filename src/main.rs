#![forbid(unsafe_code)]

//! `stdio-dictionary`: query an external steno dictionary from the shell.
//!
//! Launches the backend, completes its handshake, runs one lookup (or an
//! interactive loop), then shuts the backend down. Backend stderr and
//! protocol faults are printed to stderr as they arrive.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use stdio_dictionary::faults::{self, FaultReceiver};
use stdio_dictionary::{
    AdapterConfig, AppError, DictionaryFault, Result, SpawnConfig, StdioDictionary,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stdio-dictionary",
    about = "Query a steno dictionary served over line-delimited JSON",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML adapter configuration.
    #[arg(long, conflicts_with = "command", required_unless_present = "command")]
    config: Option<PathBuf>,

    /// Backend program to launch instead of reading a configuration file.
    #[arg(long)]
    command: Option<PathBuf>,

    /// Argument for the backend program (repeatable).
    #[arg(long = "arg", requires = "command", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Translate strokes written as `STROKE/STROKE/…`.
    Lookup {
        /// Strokes separated by `/`.
        strokes: String,
    },
    /// List the stroke sequences that produce a text.
    Reverse {
        /// Text to look up.
        text: String,
    },
    /// Read lookups from stdin: `?text` reverses, anything else translates.
    Repl,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let spawn = spawn_config(&args)?;
    let (fault_tx, fault_rx) = faults::channel();
    tokio::spawn(print_faults(fault_rx));

    let dictionary = StdioDictionary::start(&spawn, fault_tx).await?;
    info!(
        dictionary = dictionary.name(),
        longest_key = dictionary.longest_key(),
        "backend ready"
    );

    let outcome = match args.action {
        Action::Lookup { strokes } => lookup(&dictionary, &strokes).await,
        Action::Reverse { text } => reverse(&dictionary, &text).await,
        Action::Repl => repl(&dictionary).await,
    };

    dictionary.shutdown().await;
    outcome
}

fn spawn_config(args: &Cli) -> Result<SpawnConfig> {
    if let Some(path) = &args.config {
        return Ok(AdapterConfig::load_from_path(path)?.to_spawn_config());
    }

    let command = args
        .command
        .clone()
        .ok_or_else(|| AppError::Config("either --config or --command is required".into()))?;
    let mut spawn = SpawnConfig::new(command);
    spawn.args.clone_from(&args.args);
    Ok(spawn)
}

async fn lookup(dictionary: &StdioDictionary, strokes: &str) -> Result<()> {
    let strokes: Vec<&str> = strokes.split('/').collect();
    match dictionary.translate(&strokes).await? {
        Some(translation) => println!("{translation}"),
        None => println!("(no entry)"),
    }
    Ok(())
}

async fn reverse(dictionary: &StdioDictionary, text: &str) -> Result<()> {
    match dictionary.untranslate(text).await? {
        Some(outlines) if !outlines.is_empty() => {
            for outline in outlines {
                println!("{}", outline.join("/"));
            }
        }
        _ => println!("(no entry)"),
    }
    Ok(())
}

async fn repl(dictionary: &StdioDictionary) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = shutdown_signal() => {
                info!("shutdown signal received");
                return Ok(());
            }
        };

        let Some(line) = line else {
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let outcome = match line.strip_prefix('?') {
            Some(text) => reverse(dictionary, text).await,
            None => lookup(dictionary, line).await,
        };

        match outcome {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => println!("error: {err}"),
        }
    }
}

async fn print_faults(mut faults: FaultReceiver) {
    while let Some(fault) = faults.recv().await {
        match fault {
            DictionaryFault::Stderr { dictionary, line } => eprintln!("[{dictionary}] {line}"),
            DictionaryFault::MalformedLine {
                dictionary,
                raw,
                reason,
            } => eprintln!("[{dictionary}] malformed line ({reason}): {raw}"),
            DictionaryFault::Terminated {
                dictionary, reason, ..
            } => eprintln!("[{dictionary}] terminated: {reason}"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
