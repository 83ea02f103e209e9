use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actionhost_core::store::{MemoryStoreDriver, StoreDriver};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use actionhost_api::config::ServerConfig;
use actionhost_api::router::build_app_router;
use actionhost_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "actionhost_api=debug,actionhost_core=debug,actionhost_db=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(
        host = %config.host,
        port = %config.port,
        resource = %config.actions.resource_name,
        actions_dir = %config.actions.actions_dir.display(),
        "Loaded server configuration",
    );

    // --- Store ---
    let (driver, pool) = match &config.database_url {
        Some(database_url) => {
            let pool = actionhost_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            actionhost_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            actionhost_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            (
                Arc::new(actionhost_db::PgStoreDriver::new(pool.clone())) as Arc<dyn StoreDriver>,
                Some(pool),
            )
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            (Arc::new(MemoryStoreDriver::new()) as Arc<dyn StoreDriver>, None)
        }
    };

    // --- Actions ---
    let actions = config
        .actions
        .load_actions()
        .expect("Failed to load resource configuration");
    let loader = Arc::new(config.actions.process_loader());

    let mut state = AppState::build(config.clone(), actions, loader, driver)
        .expect("Failed to initialize actions");
    if let Some(pool) = pool {
        state = state.with_pool(pool);
    }

    // Load failures are deferred to invocation time; report them once here.
    let registry = Arc::clone(state.dispatcher.registry());
    tokio::spawn(async move {
        let failures = registry.ready().await;
        if failures.is_empty() {
            tracing::info!(count = registry.len(), "All actions loaded");
        } else {
            for (name, error) in &failures {
                tracing::warn!(action = %name, error = %error, "Action unavailable");
            }
            tracing::warn!(
                loaded = registry.len() - failures.len(),
                failed = failures.len(),
                "Some actions failed to load",
            );
        }
    });

    // --- Router ---
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

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };
    let drain = Duration::from_secs(config.shutdown_timeout_secs);

    // In-flight invocations get `SHUTDOWN_TIMEOUT_SECS` to finish once the
    // signal arrives.
    tokio::select! {
        result = server => result.expect("Server error"),
        () = async {
            shutdown_signal().await;
            tokio::time::sleep(drain).await;
        } => {
            tracing::warn!(timeout_secs = drain.as_secs(), "Shutdown drain timed out");
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
