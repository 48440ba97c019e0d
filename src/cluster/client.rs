use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::cluster::messages::{RebuildAck, RebuildTask, RecResponse, RecTask};
use crate::error::{AppError, AppResult};

/// Sends a scoring task to one worker and waits for its partials
pub async fn send_task(addr: &str, task: &RecTask) -> AppResult<RecResponse> {
    round_trip(addr, task).await
}

/// Sends a rebuild batch to one worker and waits for its acknowledgement
pub async fn send_rebuild(addr: &str, task: &RebuildTask) -> AppResult<RebuildAck> {
    round_trip(addr, task).await
}

/// One request, one response, then close. The caller bounds the whole
/// exchange with its own deadline.
async fn round_trip<Req, Resp>(addr: &str, req: &Req) -> AppResult<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| AppError::Worker(format!("connect {}: {}", addr, e)))?;

    let (read_half, mut write_half) = stream.into_split();

    let mut payload = serde_json::to_vec(req)
        .map_err(|e| AppError::Worker(format!("encode task: {}", e)))?;
    payload.push(b'\n');

    write_half
        .write_all(&payload)
        .await
        .map_err(|e| AppError::Worker(format!("send to {}: {}", addr, e)))?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(|e| AppError::Worker(format!("read from {}: {}", addr, e)))?;

    // A worker that failed closes the connection without responding
    if n == 0 {
        return Err(AppError::Worker(format!(
            "{} closed connection without a response",
            addr
        )));
    }

    serde_json::from_str(line.trim())
        .map_err(|e| AppError::Worker(format!("decode response from {}: {}", addr, e)))
}
