//! Worker node internals: shard scoring for the recommendation hot
//! path, the similarity kernel used during neighborhood rebuilds, and
//! the one-task-per-connection TCP server that exposes both.

pub mod scoring;
pub mod server;
pub mod similarity;

pub use server::{serve, WorkerContext};
