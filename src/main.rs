use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinerec::cache::{create_redis_client, RedisCache};
use cinerec::config::Config;
use cinerec::db;
use cinerec::routes::{self, AppState};
use cinerec::services::{MaintenanceService, RatingService, RecommendService};
use cinerec::store::{PgCatalogStore, PgHistoryStore, PgNeighborStore, PgRatingStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinerec=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Migrations complete");

    // Initialize Redis-backed recommendation cache
    let redis_client = create_redis_client(&config.redis_url)?;
    let cache = Arc::new(RedisCache::new(redis_client));
    tracing::info!("Connected to Redis");

    // Worker cluster; the list order defines shard assignment
    let worker_addrs = config.worker_addr_list();
    if worker_addrs.is_empty() {
        tracing::warn!("WORKER_ADDRS is empty; recommendation requests will fail");
    } else {
        tracing::info!(workers = worker_addrs.len(), "Worker cluster configured");
    }

    // Stores
    let ratings = Arc::new(PgRatingStore::new(db_pool.clone()));
    let catalog = Arc::new(PgCatalogStore::new(db_pool.clone()));
    let neighbors = Arc::new(PgNeighborStore::new(db_pool.clone()));
    let history = Arc::new(PgHistoryStore::new(db_pool.clone()));

    // Services
    let recommend = Arc::new(RecommendService::new(
        ratings.clone(),
        history,
        neighbors.clone(),
        cache,
        worker_addrs.clone(),
    ));
    let maintenance = Arc::new(MaintenanceService::new(
        catalog.clone(),
        neighbors,
        worker_addrs,
    ));
    let rating_service = Arc::new(RatingService::new(ratings, catalog));

    // Create application state and router
    let app_state = AppState {
        recommend,
        maintenance,
        ratings: rating_service,
    };
    let app = routes::create_router(app_state);

    // Create server address
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
