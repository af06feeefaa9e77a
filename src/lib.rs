pub mod access;
pub mod config;
pub mod db;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod models;
pub mod notifications;
pub mod reaper;
pub mod service;
pub mod validation;

use crate::config::AppConfig;
use crate::db::Database;
use crate::http::AppState;
use crate::reaper::Reaper;
use crate::service::WorkspaceService;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    init_tracing(&config.log_dir())?;

    let db = Arc::new(Database::new(&config.database_path())?);
    let service = Arc::new(WorkspaceService::new(Arc::clone(&db), &config));
    let reaper = Arc::new(Reaper::new(db, config.retention.clone()));
    Arc::clone(&reaper).spawn_interval();

    if config.cron_secret.is_none() {
        tracing::warn!("no cron secret configured; the cleanup endpoint will reject every call");
    }
    if config.identity_secret.is_none() {
        tracing::warn!("no identity secret configured; returning users cannot sign in");
    }

    let app = http::router(AppState {
        service,
        reaper,
        cron_secret: config.cron_secret.clone(),
        identity_secret: config.identity_secret.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, data_dir = %config.data_dir.display(), "taskhub server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing(log_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "taskhub.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| anyhow::anyhow!(error))
}
