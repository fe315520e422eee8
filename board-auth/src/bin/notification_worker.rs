//! Delivers queued notification emails and runs the periodic expiry sweeps.

use board_auth::{
    config::BoardConfig,
    db,
    services::{
        Database, EmailVerifier, InvitationService, NotificationDispatcher, NotificationWorker,
        PasswordResetService, RedisQueue, RedisService, RoleFreshness, SmtpMailer, TokenService,
    },
};
use chrono::Utc;
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = BoardConfig::from_env()?;

    init_tracing(
        "notification-worker",
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    let pool = db::create_pool(&config.database)
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
    let verifier = EmailVerifier::new(&config.verification.secret, &config.app.url)
        .map_err(AppError::ConfigError)?;

    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        cache,
        mailer.clone(),
        config.invitation_links(),
        verifier,
        config.notifications.dedup_ttl_seconds,
    ));
    let worker = NotificationWorker::new(queue.clone(), dispatcher, config.worker_settings());

    let invitations = InvitationService::new(
        store.clone(),
        queue,
        config.invitations.expiry_hours,
    );
    let password_reset = PasswordResetService::new(
        store.clone(),
        mailer,
        TokenService::new(store, RoleFreshness::Snapshot),
        &config.app.frontend_url,
        config.password_reset.ttl_minutes,
    );

    let shutdown = CancellationToken::new();
    let sweep = tokio::spawn(run_sweeps(
        invitations,
        password_reset,
        Duration::from_secs(config.notifications.sweep_interval_seconds.max(1)),
        shutdown.clone(),
    ));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    tracing::info!(
        queue = %config.notifications.queue_key,
        max_attempts = config.notifications.max_attempts,
        "Starting notification worker"
    );
    worker.run(shutdown.clone()).await?;

    shutdown.cancel();
    if let Err(e) = sweep.await {
        tracing::error!(error = %e, "Maintenance sweep task panicked");
    }

    tracing::info!("Notification worker shutdown complete");
    Ok(())
}

/// Expire stale invitations and purge old reset tokens on a fixed interval.
async fn run_sweeps(
    invitations: InvitationService,
    password_reset: PasswordResetService,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let now = Utc::now();
                if let Err(e) = invitations.expire_stale(now).await {
                    tracing::error!(error = %e, "Invitation expiry sweep failed");
                }
                if let Err(e) = password_reset.cleanup_expired(now).await {
                    tracing::error!(error = %e, "Password reset cleanup failed");
                }
            }
        }
    }
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
        _ = ctrl_c => tracing::info!("Received SIGINT, stopping worker"),
        _ = terminate => tracing::info!("Received SIGTERM, stopping worker"),
    }
}
