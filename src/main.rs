use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use reporting_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match api::config::load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            api::config::init_tracing("info", false);
            error!(error = %err, "Refusing to start");
            return Err(err.into());
        }
    };
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let store = api::db::RestStore::from_config(&cfg).context("failed to build backend client")?;
    let addr = cfg.bind_addr()?;

    if cfg.database_timeout().is_none() {
        warn!("Backend timeout disabled; a hung query blocks its request indefinitely");
    }

    let state = api::AppState::new(cfg, Arc::new(store));
    let app = api::app_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("reporting-api listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("reporting-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
