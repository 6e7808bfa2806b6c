use chrono::Utc;
use dias_sin_accidentes::{router, AppConfig, AppState, CounterStore, MidnightScheduler};
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = AppConfig::from_env();
    if config.uses_default_password() {
        warn!("ADMIN_PASSWORD not set, using the built-in default");
    }

    let store = Arc::new(CounterStore::new(config.data_path.clone()));
    info!("data file: {}", store.path().display());

    match store.ensure_daily_increment(None).await {
        Ok(rollover) => info!(
            increments_applied = rollover.increments_applied,
            "startup daily check done"
        ),
        Err(err) => error!("startup daily check failed: {err}"),
    }

    let scheduler = {
        let store = Arc::clone(&store);
        MidnightScheduler::new(move || {
            let store = Arc::clone(&store);
            async move { store.ensure_daily_increment(None).await.map(|_| ()) }
        })
    };
    scheduler.start();

    let app = router(AppState::new(Arc::clone(&store), config.admin_password));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    match store.backup(Utc::now()).await {
        Ok(path) => info!("backup created at {}", path.display()),
        Err(err) => error!("failed to create backup during shutdown: {err}"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
