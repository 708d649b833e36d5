use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metricwatch_api::background;
use metricwatch_api::config::{LogFormat, ServerConfig};
use metricwatch_api::router::build_app_router;
use metricwatch_api::service::MonitoringService;
use metricwatch_api::state::AppState;
use metricwatch_events::EventJournal;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let (text_layer, json_layer) = match config.log_format {
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "metricwatch_api=debug,metricwatch_alarms=debug,tower_http=debug".into()
            }),
        )
        .with(text_layer)
        .with(json_layer)
        .init();

    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Monitoring service ---
    let service = Arc::new(MonitoringService::new(&config));
    service
        .on_start()
        .await
        .expect("Failed to start monitoring service");

    // --- Background tasks ---
    let background_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(background::metrics_retention::run(
        Arc::clone(service.store()),
        config.metrics_retention_hours,
        background_cancel.clone(),
    ));
    let journal_handle = tokio::spawn(EventJournal::run(
        service.bus().subscribe(),
        background_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        service: Arc::clone(&service),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Alarm jobs stop and state is saved before the background tasks end.
    if let Err(e) = service.on_stop().await {
        tracing::error!(error = %e, "Failed to persist state on shutdown");
    }

    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    background_cancel.cancel();
    let _ = tokio::time::timeout(grace, retention_handle).await;
    let _ = tokio::time::timeout(grace, journal_handle).await;
    tracing::info!("Background tasks stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
