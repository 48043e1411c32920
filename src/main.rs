use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use box_office::{
    app,
    clock::SystemClock,
    config::Config,
    database::Database,
    repository::{MemorySalesRepository, PgSalesRepository, SalesRepository},
    services::ExpirySweeper,
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    if config.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting box office API ({})", config.app.environment);

    // Хранилище: PostgreSQL, если задан DATABASE_URL, иначе память процесса
    let (repository, db): (Arc<dyn SalesRepository>, Option<Database>) = match &config.database.url {
        Some(url) => {
            let db = Database::connect(url, &config.database)
                .await
                .context("failed to connect to database")?;
            db.run_migrations().await.context("failed to run migrations")?;
            let repository: Arc<dyn SalesRepository> = Arc::new(PgSalesRepository::new(&db));
            (repository, Some(db))
        }
        None => {
            warn!("DATABASE_URL is not set, sales are kept in memory only");
            let repository: Arc<dyn SalesRepository> = Arc::new(MemorySalesRepository::new());
            (repository, None)
        }
    };

    let state = AppState::new(config.clone(), repository, Arc::new(SystemClock), db);

    let shows = state.engine.restore().await.context("failed to restore seat maps")?;
    info!("Restored {} shows", shows);

    // --- Start background tasks ---
    ExpirySweeper::new(state.engine.clone(), config.sweeper.interval()).spawn();
    state.notifier.spawn_log_consumer();

    // --- Start the web server ---
    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.app.host, config.app.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
