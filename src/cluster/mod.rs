//! Coordinator-to-worker wire protocol.
//!
//! One request, one response, then close. Messages are single JSON
//! documents terminated by a newline; readers buffer and tolerate
//! surrounding whitespace. There is no error frame: a worker that fails
//! closes the connection without responding.

pub mod client;
pub mod messages;

pub use client::{send_rebuild, send_task};
pub use messages::{PartialScore, RebuildAck, RebuildTask, RecResponse, RecTask, WorkerRequest};
