//! Rollcall - QR attendance tracking service

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{
            SqlxAttendanceRepository, SqlxAuthSessionRepository, SqlxSessionRepository,
            SqlxUserRepository,
        },
        SqlxAttendanceStore,
    },
    services::{AttendanceService, SessionService, SessionSweeper, UserService},
};

/// How often expired login sessions are purged
const AUTH_SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Rollcall...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Initialize repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let attendance_repo = SqlxAttendanceRepository::boxed(pool.clone());
    let auth_session_repo = SqlxAuthSessionRepository::boxed(pool.clone());

    // Initialize services
    let user_service = Arc::new(UserService::with_session_expiration(
        user_repo.clone(),
        auth_session_repo,
        config.auth.session_expiration_days,
    ));
    let session_service = Arc::new(SessionService::new(session_repo.clone()));
    let attendance_service = Arc::new(AttendanceService::new(
        attendance_repo,
        session_repo,
        user_repo,
        config.attendance.late_after_minutes,
    ));
    let sweeper = Arc::new(SessionSweeper::new(
        SqlxAttendanceStore::boxed(pool.clone()),
        Duration::from_secs(config.attendance.sweep_interval_seconds),
    ));

    if user_service.needs_setup().await? {
        tracing::warn!("No accounts yet; create the administrator via POST /api/v1/auth/setup");
    }

    // Start the session sweeper
    let sweeper_handle = if config.attendance.sweeper_enabled {
        Some(sweeper.start())
    } else {
        tracing::info!("Session sweeper disabled by configuration");
        None
    };

    // Start login session cleanup task
    {
        let user_service = user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(AUTH_SESSION_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Expired login sessions removed"),
                    Err(e) => tracing::warn!("Login session cleanup failed: {:#}", e),
                }
            }
        });
    }

    let state = AppState {
        pool: pool.clone(),
        user_service,
        session_service,
        attendance_service,
        sweeper,
        session_expiration_days: config.auth.session_expiration_days,
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper_handle {
        handle.shutdown().await;
    }
    pool.close().await;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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
