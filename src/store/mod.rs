//! Persistent store contracts and their Postgres implementations.
//!
//! The engine owns neighborhoods and recommendation history; ratings
//! and the catalog are owned by the catalog layer and consumed here
//! through the same trait seams. All handles are constructor-injected;
//! nothing in the engine holds process-wide mutable state.

pub mod catalog;
pub mod history;
pub mod neighborhoods;
pub mod ratings;

pub use catalog::{CatalogStore, PgCatalogStore};
pub use history::{HistoryStore, PgHistoryStore};
pub use neighborhoods::{NeighborStore, PgNeighborStore};
pub use ratings::{PgRatingStore, RatingStore};
