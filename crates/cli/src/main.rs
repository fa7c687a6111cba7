use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tutor_dispatch::{ChatCompletionClient, Dispatcher, DispatcherConfig, LogNotifier};
use tutor_extract::{MessageScanner, SeenSet, SnapshotDocument};
use tutor_protocol::{ClearAck, ProcessNowAck, QueueStatus};

use tutor_cli::config::HostConfig;
use tutor_cli::server;
use tutor_cli::watch::SnapshotWatcher;

#[derive(Parser)]
#[command(name = "tutor")]
#[command(about = "Adaptive batch responder for course discussion boards", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config (default: ./tutor.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher, snapshot scan loop, and command API
    Serve(ServeArgs),

    /// One-shot extraction from a snapshot file (JSON to stdout)
    Scan(ScanArgs),

    /// Query the queue status of a running server
    Status(ControlArgs),

    /// Ask a running server to drain its queue immediately
    #[command(name = "process-now")]
    ProcessNow(ControlArgs),

    /// Drop everything pending on a running server
    Clear(ControlArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address for the command API (overrides the config)
    #[arg(long)]
    bind: Option<String>,

    /// Snapshot directory to scan (overrides the config)
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

#[derive(Args)]
struct ScanArgs {
    /// Page snapshot to scan
    snapshot: PathBuf,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct ControlArgs {
    /// Base URL of a running `tutor serve`
    #[arg(long, default_value = "http://127.0.0.1:7600")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = HostConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => run_serve(args, config).await,
        Commands::Scan(args) => run_scan(args, &config),
        Commands::Status(args) => run_status(args).await,
        Commands::ProcessNow(args) => run_process_now(args).await,
        Commands::Clear(args) => run_clear(args).await,
    }
}

async fn run_serve(args: ServeArgs, config: HostConfig) -> Result<()> {
    if config.completion.api_key.is_none() {
        log::warn!("no completion credential configured; every reply will use the fallback");
    }
    let client = Arc::new(ChatCompletionClient::new(config.completion.to_client_config()));
    let dispatcher = Dispatcher::start(client, Arc::new(LogNotifier), DispatcherConfig::default());

    let snapshot_dir = args
        .snapshot_dir
        .or_else(|| config.scan.snapshot_dir.clone());
    if let Some(dir) = snapshot_dir {
        let scanner = MessageScanner::new(config.scan.to_scan_config()?);
        let trigger = config.scan.to_trigger_config();
        let watcher = SnapshotWatcher::new(dir, scanner, dispatcher.clone());
        tokio::spawn(async move {
            if let Err(err) = watcher.run(trigger).await {
                log::error!("snapshot scan loop stopped: {err:#}");
            }
        });
    } else {
        log::info!("no snapshot directory configured; scanning disabled");
    }

    let bind = args.bind.unwrap_or(config.server.bind);
    let app = server::router(dispatcher);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    log::info!("serving command API on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn run_scan(args: ScanArgs, config: &HostConfig) -> Result<()> {
    let raw = std::fs::read_to_string(&args.snapshot)
        .with_context(|| format!("Failed to read {}", args.snapshot.display()))?;
    let doc = SnapshotDocument::from_json(&raw)
        .with_context(|| format!("Invalid snapshot {}", args.snapshot.display()))?;
    let scanner = MessageScanner::new(config.scan.to_scan_config()?);
    let mut marks = SeenSet::new();
    let found = scanner.scan(&doc, &mut marks);

    let output = if args.pretty {
        serde_json::to_string_pretty(&found)?
    } else {
        serde_json::to_string(&found)?
    };
    println!("{output}");
    Ok(())
}

async fn run_status(args: ControlArgs) -> Result<()> {
    let status: QueueStatus = reqwest::get(endpoint(&args.server, "/status"))
        .await
        .context("Server unreachable")?
        .error_for_status()
        .context("Status request failed")?
        .json()
        .await
        .context("Invalid status response")?;

    let processing = if status.processing { " (processing)" } else { "" };
    println!(
        "{} message(s) queued{processing}; estimated delay: {}",
        status.queue_size, status.estimated_delay_label
    );
    Ok(())
}

async fn run_process_now(args: ControlArgs) -> Result<()> {
    let ack: ProcessNowAck = post_json(&args.server, "/process-now").await?;
    match ack {
        ProcessNowAck::Started => println!("Processing started"),
        ProcessNowAck::AlreadyDraining => println!("A drain cycle is already running"),
        ProcessNowAck::Empty => println!("Queue is empty"),
    }
    Ok(())
}

async fn run_clear(args: ControlArgs) -> Result<()> {
    let ack: ClearAck = post_json(&args.server, "/clear").await?;
    println!("Cleared {} message(s)", ack.cleared);
    Ok(())
}

async fn post_json<T: serde::de::DeserializeOwned>(server: &str, path: &str) -> Result<T> {
    reqwest::Client::new()
        .post(endpoint(server, path))
        .send()
        .await
        .context("Server unreachable")?
        .error_for_status()
        .with_context(|| format!("{path} request failed"))?
        .json()
        .await
        .with_context(|| format!("Invalid {path} response"))
}

fn endpoint(server: &str, path: &str) -> String {
    format!("{}{path}", server.trim_end_matches('/'))
}
