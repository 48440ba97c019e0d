use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::cluster::messages::{RebuildAck, RebuildTask, RecResponse, WorkerRequest};
use crate::error::AppResult;
use crate::store::{NeighborStore, RatingStore};
use crate::worker::scoring;
use crate::worker::similarity::{self, SimilarityParams};

/// Everything a worker needs to serve tasks
pub struct WorkerContext {
    pub node_id: String,
    pub neighbors: Arc<dyn NeighborStore>,
    pub ratings: Arc<dyn RatingStore>,
}

/// Accept loop: one connection carries one task, answered and closed
/// by its own tokio task. Connections share no mutable state.
pub async fn serve(listener: TcpListener, ctx: Arc<WorkerContext>) -> anyhow::Result<()> {
    loop {
        let (conn, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                continue;
            }
        };

        tracing::debug!(peer = %peer, "Connection accepted");
        let ctx = ctx.clone();
        tokio::spawn(async move {
            handle_conn(conn, ctx).await;
        });
    }
}

/// Reads one request, answers it, closes. On any failure the
/// connection is closed without a response; there is no error frame.
async fn handle_conn(conn: TcpStream, ctx: Arc<WorkerContext>) {
    let (read_half, mut write_half) = conn.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    match reader.read_line(&mut line).await {
        Ok(0) => return,
        Ok(_) => {}
        Err(e) => {
            tracing::error!(node = %ctx.node_id, error = %e, "Read task failed");
            return;
        }
    }

    let request: WorkerRequest = match serde_json::from_str(line.trim()) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(node = %ctx.node_id, error = %e, "Decode task failed");
            return;
        }
    };

    let reply = match request {
        WorkerRequest::Recommend(task) => {
            tracing::info!(
                node = %ctx.node_id,
                user_id = task.user_id,
                shard = task.shard_id,
                shards = task.shards,
                ratings = task.ratings.len(),
                "Scoring task received"
            );
            let start = Instant::now();

            match scoring::compute_shard_partials(&task, ctx.neighbors.as_ref()).await {
                Ok(partials) => {
                    tracing::info!(
                        node = %ctx.node_id,
                        user_id = task.user_id,
                        shard = task.shard_id,
                        partials = partials.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Scoring task completed"
                    );
                    serde_json::to_vec(&RecResponse {
                        shard_id: task.shard_id,
                        partials,
                    })
                }
                Err(e) => {
                    tracing::error!(node = %ctx.node_id, error = %e, "Scoring task failed");
                    return;
                }
            }
        }
        WorkerRequest::Rebuild(task) => {
            tracing::info!(
                node = %ctx.node_id,
                batch = task.i_idxs.len(),
                metric = %task.metric,
                k = task.k,
                "Rebuild batch received"
            );
            let start = Instant::now();

            match handle_rebuild(&task, &ctx).await {
                Ok(processed) => {
                    tracing::info!(
                        node = %ctx.node_id,
                        processed,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Rebuild batch completed"
                    );
                    serde_json::to_vec(&RebuildAck { processed })
                }
                Err(e) => {
                    tracing::error!(node = %ctx.node_id, error = %e, "Rebuild batch failed");
                    return;
                }
            }
        }
    };

    let mut payload = match reply {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(node = %ctx.node_id, error = %e, "Encode response failed");
            return;
        }
    };
    payload.push(b'\n');

    if let Err(e) = write_half.write_all(&payload).await {
        tracing::error!(node = %ctx.node_id, error = %e, "Write response failed");
    }
}

/// Recomputes and stores the neighborhoods of one batch of indices
async fn handle_rebuild(task: &RebuildTask, ctx: &WorkerContext) -> AppResult<usize> {
    let vectors = ctx.ratings.indexed_item_vectors().await?;

    let params = SimilarityParams {
        k: task.k,
        min_common_users: task.min_common_users,
        shrink: task.shrink,
    };
    let docs = similarity::build_neighborhoods(&task.i_idxs, &vectors, &task.metric, &params);

    for doc in &docs {
        ctx.neighbors.put_neighborhood(doc).await?;
    }
    Ok(docs.len())
}
