mod aligner;
mod cli;
mod config;
mod dispatcher;
mod error;
mod fetcher;
mod orchestrator;
mod pool;
mod server;
mod state_machine;
mod workspace;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aligner::{AlignmentClient, CommandAligner, Resources};
use cli::Cli;
use config::RealignConfig;
use dispatcher::{ResultDispatcher, WebhookNotifier};
use fetcher::Fetcher;
use orchestrator::JobOrchestrator;
use pool::AlignmentPool;
use server::AppState;
use workspace::WorkspaceManager;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = RealignConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("realign={level},tower_http={level}", level = config.log).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting realign");

    let workspaces = Arc::new(WorkspaceManager::new(&config.data_dir));
    tokio::fs::create_dir_all(workspaces.root())
        .await
        .with_context(|| format!("Failed to create {}", workspaces.root().display()))?;

    let aligner = CommandAligner::from_config(&config.aligner, config.align_threads);
    let client = AlignmentClient::new(
        Arc::new(aligner),
        Resources::new(&config.aligner.resources_dir),
    );
    let pool = AlignmentPool::new(Arc::new(client), config.alignment_workers);
    let workers = pool.size();

    let webhook = config
        .webhook_url
        .clone()
        .map(|url| WebhookNotifier::new(url, config.webhook_timeout()))
        .transpose()
        .context("Failed to build webhook client")?;
    match &webhook {
        Some(hook) => tracing::info!(url = hook.url(), "Webhook enabled"),
        None => tracing::info!("No webhook configured"),
    }

    let fetcher = Fetcher::new(config.fetch_timeout()).context("Failed to build HTTP client")?;
    let dispatcher = ResultDispatcher::new(workspaces.clone(), webhook);
    let orchestrator = Arc::new(JobOrchestrator::new(workspaces, fetcher, pool, dispatcher));

    let app = server::router(AppState {
        orchestrator: Arc::clone(&orchestrator),
    });

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        workers,
        threads = config.align_threads,
        "Listening"
    );

    // Jobs are cancelled as soon as the signal arrives so held sync
    // connections drain promptly; the second wait catches jobs admitted
    // while the server was draining.
    let draining = Arc::clone(&orchestrator);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            draining.shutdown().await;
        })
        .await?;

    orchestrator.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
