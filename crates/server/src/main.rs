use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use db::DBService;
use server::{app, config::Config, state::AppState};
use services::services::{ai_client::AiClient, background_jobs::JobQueue, disputes::DisputeWindowService};
use tokio::signal;
use tracing::{info, warn};

const JOB_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::parse();
    utils::logging::init("info,server=debug,services=debug,db=info,tower_http=info");

    let db = DBService::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;

    let ai = AiClient::new(config.ai_config()).context("Failed to build AI client")?;
    if !ai.is_configured() {
        warn!("AI_API_KEY is not set; generation, grading and source embedding will fail until it is");
    }

    let jobs = JobQueue::new();
    DisputeWindowService::spawn(db.clone(), config.dispute_check_interval());
    spawn_job_pruner(jobs.clone());

    let state = AppState::new(db, Arc::new(ai), jobs, config.settings());
    let router = app(state, config.cors_layer()?);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = shutdown_signal().await {
                warn!(error = %e, "Shutdown signal handler failed");
            }
        })
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Drop finished job records after a day
fn spawn_job_pruner(jobs: JobQueue) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(JOB_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let pruned = jobs.prune(chrono::Duration::hours(24)).await;
            if pruned > 0 {
                info!(pruned, "Pruned finished jobs");
            }
        }
    });
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => res?,
        res = terminate => res?,
    }

    info!("Shutdown signal received");
    Ok(())
}
