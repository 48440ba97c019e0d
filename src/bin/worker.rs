use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinerec::config::WorkerConfig;
use cinerec::db;
use cinerec::store::{PgNeighborStore, PgRatingStore};
use cinerec::worker::{self, WorkerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinerec=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = WorkerConfig::from_env()?;

    // Initialize database connection pool
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!(node = %config.node_id, "Connected to PostgreSQL");

    let ctx = Arc::new(WorkerContext {
        node_id: config.node_id.clone(),
        neighbors: Arc::new(PgNeighborStore::new(db_pool.clone())),
        ratings: Arc::new(PgRatingStore::new(db_pool)),
    });

    let listener = tokio::net::TcpListener::bind(&config.worker_addr).await?;
    tracing::info!(node = %config.node_id, addr = %config.worker_addr, "Worker listening");

    worker::serve(listener, ctx).await
}
