use identity_server::{
    build_router,
    config::{IdentityConfig, StoreBackend},
    services::{
        Dispatcher, IdentityService, MemoryStore, PgStore, PrincipalResolver, Store, TracingSink,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )
    .map_err(AppError::ConfigError)?;

    identity_server::services::metrics::init_metrics().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to register metrics: {}", e))
    })?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        store = ?config.store,
        "Starting identity server"
    );

    let store: Arc<dyn Store> = match config.store {
        StoreBackend::Postgres => {
            tracing::info!("Initializing database connections");
            let store = PgStore::connect(&config.database)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
            store
                .migrate()
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
            tracing::info!("Database initialized successfully");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let (dispatcher, dispatch_handle) = Dispatcher::start(
        Arc::new(TracingSink),
        Arc::new(TracingSink),
        config.events.queue_size,
    );
    let resolver = PrincipalResolver::new(config.security.cluster_keys.clone());
    tracing::info!(
        cluster_keys = config.security.cluster_keys.len(),
        "Principal resolver initialized"
    );

    let identity = IdentityService::new(
        store,
        resolver,
        dispatcher.clone(),
        config.legacy_api_key_delete_via_update,
    );

    let state = AppState {
        config: config.clone(),
        identity: Arc::new(identity),
    };
    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.common.shutdown_grace_seconds))
    .await?;

    // Flush queued events before exiting.
    dispatcher.shutdown();
    if let Err(e) = dispatch_handle.await {
        tracing::error!(error = %e, "Event dispatcher task failed");
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal(grace_seconds: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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

    // Give in-flight requests time to complete
    tokio::time::sleep(Duration::from_secs(grace_seconds)).await;
}
