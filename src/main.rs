use std::sync::Arc;

use anyhow::{Context, Result};
use storage_sdk::{StorageClient, StorageConfig};
use tracing_subscriber::EnvFilter;

use docrender::{
    AppState, app,
    cnfg::{self, AppConfig, AppEnv},
    converter::LibreOfficeConverter,
};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.env {
        AppEnv::Production => builder.json().init(),
        AppEnv::Development => builder.init(),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = cnfg::load_config().context("loading configuration")?;
    init_tracing(&config);

    let storage = StorageClient::new(StorageConfig::new(
        &config.supabase_url,
        &config.supabase_service_key,
    ))
    .context("creating storage client")?;
    let converter =
        LibreOfficeConverter::new(&config.converter_bin).with_timeout(config.converter_timeout);

    if config.api_key.is_none() {
        tracing::warn!("RENDER_API_KEY is not set; every render request will be rejected");
    }

    let state = AppState::new(&config, Arc::new(storage), Arc::new(converter));
    state
        .workspace
        .ensure_dir()
        .await
        .with_context(|| format!("creating scratch directory {}", config.scratch_dir.display()))?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
