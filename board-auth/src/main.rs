use board_auth::{
    build_router,
    config::BoardConfig,
    db,
    services::{Database, RedisQueue, RedisService, SmtpMailer},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = BoardConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    board_auth::services::metrics::init_metrics().map_err(AppError::InternalError)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting board-auth"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    let store = Arc::new(Database::new(pool));

    let redis = RedisService::new(&config.redis)
        .await
        .map_err(AppError::InternalError)?;
    let queue = Arc::new(
        RedisQueue::connect(&config.redis, &config.notifications.queue_key)
            .await
            .map_err(AppError::InternalError)?,
    );
    let cache = Arc::new(redis);

    let mailer = Arc::new(
        SmtpMailer::new(&config.smtp, &config.app.name)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
    );
    tracing::info!("Infrastructure initialized");

    let addr = config.common.socket_addr();
    let state = AppState::new(config, store, cache, queue, mailer)?;
    let app = build_router(state);

    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
