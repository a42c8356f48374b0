use rusty_library_lending::{
    adapters::{FormatValidator, JsonFileSnapshotStore},
    api::{handlers::AppState, router::create_router},
    application::ServiceDependencies,
    config::AppConfig,
    repository::{self, Repository},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rusty_library_lending=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        loan_period_days = config.policy.loan_period_days,
        daily_fine_rate = config.policy.daily_fine_rate,
        block_borrow_on_unpaid_fine = config.policy.block_borrow_on_unpaid_fine,
        "Configuration loaded"
    );

    // Load the snapshot and build the repository
    let store = Arc::new(JsonFileSnapshotStore::new(config.snapshot_path()));
    let repo = Repository::open(store)?.shared();

    // Create service dependencies
    let service_deps = ServiceDependencies::new(
        repo.clone(),
        config.policy.clone(),
        Arc::new(FormatValidator::new()),
    );

    // Create application state
    let app_state = Arc::new(AppState { service_deps });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush the final state before exiting
    repository::lock(&repo).persist()?;
    tracing::info!("Repository flushed, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
