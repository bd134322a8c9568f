use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sea_orm::Database;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use clipcast_core::tracing::init_tracing;
use clipcast_scheduler::config::SchedulerConfig;
use clipcast_scheduler::router::build_router;
use clipcast_scheduler::state::AppState;
use clipcast_scheduler::usecase::dispatch::DispatchBatchInput;

#[derive(Parser)]
#[command(name = "scheduler", about = "Dispatches scheduled social-media posts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API, including the cron trigger (default).
    Serve,
    /// Run a single dispatch batch and print the report as JSON.
    Dispatch {
        /// Candidates to process; defaults to DISPATCH_BATCH_LIMIT.
        #[arg(long)]
        limit: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = SchedulerConfig::from_env()?;
    let db = Database::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    let state = AppState::from_config(&config, db)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state, config.port).await,
        Command::Dispatch { limit } => dispatch_once(state, limit).await,
    }
}

async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let router = build_router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("scheduler listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server error")
}

async fn dispatch_once(state: AppState, limit: Option<u64>) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing in-flight deliveries");
            on_signal.cancel();
        }
    });

    let input = DispatchBatchInput {
        now: Utc::now(),
        limit,
    };
    let report = state.dispatch_usecase().execute(input, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
