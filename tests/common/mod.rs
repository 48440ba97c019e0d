//! In-memory store fakes and TCP helpers shared by the integration
//! suites. Fakes implement the same trait seams the Postgres stores
//! do, so services and workers run unmodified against them.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use cinerec::cache::{CacheKey, RecCache};
use cinerec::error::AppResult;
use cinerec::models::{
    ItemVector, MovieDoc, Neighbor, NeighborhoodDoc, PendingMovieWithoutIdx,
    PendingMovieWithoutSims, RatingDoc, RatingStats, Recommendation,
};
use cinerec::store::{CatalogStore, HistoryStore, NeighborStore, RatingStore};
use cinerec::worker::{self, WorkerContext};

// ----- Neighborhood store -----

#[derive(Default)]
struct MemNeighborsInner {
    by_movie: HashMap<i64, Vec<Neighbor>>,
    docs: HashMap<i64, NeighborhoodDoc>,
}

/// In-memory neighborhood store
#[derive(Default)]
pub struct MemNeighbors {
    inner: Mutex<MemNeighborsInner>,
}

impl MemNeighbors {
    pub fn seed(&self, movie_id: i64, neighbors: Vec<Neighbor>) {
        self.inner
            .lock()
            .unwrap()
            .by_movie
            .insert(movie_id, neighbors);
    }

    pub fn doc_count(&self) -> usize {
        self.inner.lock().unwrap().docs.len()
    }

    pub fn docs_snapshot(&self) -> Vec<NeighborhoodDoc> {
        self.inner.lock().unwrap().docs.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl NeighborStore for MemNeighbors {
    async fn get_neighbors(&self, movie_id: i64, limit: usize) -> AppResult<Vec<Neighbor>> {
        let inner = self.inner.lock().unwrap();
        let mut neighbors = inner
            .by_movie
            .get(&movie_id)
            .cloned()
            .or_else(|| {
                inner
                    .docs
                    .values()
                    .find(|d| d.movie_id == movie_id)
                    .map(|d| d.neighbors.clone())
            })
            .unwrap_or_default();
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    async fn put_neighborhood(&self, doc: &NeighborhoodDoc) -> AppResult<()> {
        doc.validate()?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .by_movie
            .insert(doc.movie_id, doc.neighbors.clone());
        inner.docs.insert(doc.i_idx, doc.clone());
        Ok(())
    }

    async fn has_neighborhood(&self, i_idx: i64) -> AppResult<bool> {
        Ok(self.inner.lock().unwrap().docs.contains_key(&i_idx))
    }

    async fn count_entries(&self, metric: &str, k: usize) -> AppResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .docs
            .values()
            .filter(|d| d.metric == metric && d.k == k)
            .count() as i64)
    }
}

// ----- Rating store -----

#[derive(Default)]
struct MemRatingsInner {
    /// Insertion order preserved: it defines the shard partition
    ratings: Vec<RatingDoc>,
    vectors: Vec<ItemVector>,
}

/// In-memory rating store
#[derive(Default)]
pub struct MemRatings {
    inner: Mutex<MemRatingsInner>,
}

impl MemRatings {
    pub fn seed_user(&self, user_id: i64, items: &[(i64, f64)]) {
        let mut inner = self.inner.lock().unwrap();
        for (movie_id, rating) in items {
            inner.ratings.push(RatingDoc {
                user_id,
                movie_id: *movie_id,
                rating: *rating,
                timestamp: 1700000000,
            });
        }
    }

    pub fn set_vectors(&self, vectors: Vec<ItemVector>) {
        self.inner.lock().unwrap().vectors = vectors;
    }
}

#[async_trait::async_trait]
impl RatingStore for MemRatings {
    async fn get_all_by_user(&self, user_id: i64) -> AppResult<Vec<RatingDoc>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ratings
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_one(&self, user_id: i64, movie_id: i64) -> AppResult<Option<RatingDoc>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ratings
            .iter()
            .find(|r| r.user_id == user_id && r.movie_id == movie_id)
            .cloned())
    }

    async fn upsert(&self, user_id: i64, movie_id: i64, rating: f64) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .ratings
            .iter_mut()
            .find(|r| r.user_id == user_id && r.movie_id == movie_id)
        {
            Some(existing) => {
                existing.rating = rating;
                existing.timestamp += 1;
            }
            None => inner.ratings.push(RatingDoc {
                user_id,
                movie_id,
                rating,
                timestamp: 1700000000,
            }),
        }
        Ok(())
    }

    async fn indexed_item_vectors(&self) -> AppResult<Vec<ItemVector>> {
        Ok(self.inner.lock().unwrap().vectors.clone())
    }
}

// ----- Cache -----

/// In-memory recommendation cache
#[derive(Default)]
pub struct MemCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemCache {
    pub fn seed(&self, key: &CacheKey, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(format!("{}", key), value.to_string());
    }

    pub fn get_raw(&self, key: &CacheKey) -> Option<String> {
        self.entries.lock().unwrap().get(&format!("{}", key)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl RecCache for MemCache {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(&format!("{}", key)).cloned())
    }

    async fn set(&self, key: &CacheKey, value: String, _ttl_seconds: u64) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(format!("{}", key), value);
        Ok(())
    }
}

// ----- History -----

/// In-memory recommendation history
#[derive(Default)]
pub struct MemHistory {
    records: Mutex<Vec<Recommendation>>,
}

impl MemHistory {
    pub fn records(&self) -> Vec<Recommendation> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemHistory {
    async fn insert(&self, rec: &Recommendation) -> AppResult<()> {
        self.records.lock().unwrap().push(rec.clone());
        Ok(())
    }

    async fn find_by_user(&self, user_id: i64, limit: i64) -> AppResult<Vec<Recommendation>> {
        let mut out: Vec<Recommendation> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        out.truncate(limit as usize);
        Ok(out)
    }
}

// ----- Catalog -----

#[derive(Default)]
struct MemCatalogInner {
    movies: Vec<MovieDoc>,
    /// Dense indices that already hold a neighborhood entry
    built: HashSet<i64>,
}

/// In-memory catalog store
#[derive(Default)]
pub struct MemCatalog {
    inner: Mutex<MemCatalogInner>,
}

impl MemCatalog {
    pub fn seed_movie(&self, movie_id: i64, i_idx: Option<i64>, rating_count: i64) {
        self.inner.lock().unwrap().movies.push(MovieDoc {
            movie_id,
            i_idx,
            title: format!("movie {}", movie_id),
            rating_stats: RatingStats {
                average: 0.0,
                count: rating_count,
                last_rated_at: None,
            },
        });
    }

    pub fn mark_built(&self, i_idx: i64) {
        self.inner.lock().unwrap().built.insert(i_idx);
    }

    pub fn assigned_indices(&self) -> Vec<(i64, i64)> {
        self.inner
            .lock()
            .unwrap()
            .movies
            .iter()
            .filter_map(|m| m.i_idx.map(|idx| (m.movie_id, idx)))
            .collect()
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemCatalog {
    async fn get(&self, movie_id: i64) -> AppResult<Option<MovieDoc>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .movies
            .iter()
            .find(|m| m.movie_id == movie_id)
            .cloned())
    }

    async fn update_rating_stats(&self, movie_id: i64, stats: &RatingStats) -> AppResult<()> {
        if let Some(movie) = self
            .inner
            .lock()
            .unwrap()
            .movies
            .iter_mut()
            .find(|m| m.movie_id == movie_id)
        {
            movie.rating_stats = stats.clone();
        }
        Ok(())
    }

    async fn count_eligible(&self, min_ratings: i64) -> AppResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .movies
            .iter()
            .filter(|m| m.rating_stats.count >= min_ratings)
            .count() as i64)
    }

    async fn count_indexed(&self, min_ratings: i64) -> AppResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .movies
            .iter()
            .filter(|m| m.rating_stats.count >= min_ratings && m.i_idx.is_some())
            .count() as i64)
    }

    async fn find_missing_index(
        &self,
        min_ratings: i64,
        limit: i64,
    ) -> AppResult<Vec<PendingMovieWithoutIdx>> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<&MovieDoc> = inner
            .movies
            .iter()
            .filter(|m| m.i_idx.is_none() && m.rating_stats.count >= min_ratings)
            .collect();
        pending.sort_by(|a, b| b.rating_stats.count.cmp(&a.rating_stats.count));
        pending.truncate(limit as usize);
        Ok(pending
            .into_iter()
            .map(|m| PendingMovieWithoutIdx {
                movie_id: m.movie_id,
                title: m.title.clone(),
                ratings_count: m.rating_stats.count,
            })
            .collect())
    }

    async fn find_unbuilt(
        &self,
        min_ratings: i64,
        limit: i64,
    ) -> AppResult<Vec<PendingMovieWithoutSims>> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<&MovieDoc> = inner
            .movies
            .iter()
            .filter(|m| {
                m.rating_stats.count >= min_ratings
                    && m.i_idx.is_some_and(|idx| !inner.built.contains(&idx))
            })
            .collect();
        pending.sort_by(|a, b| b.rating_stats.count.cmp(&a.rating_stats.count));
        pending.truncate(limit as usize);
        Ok(pending
            .into_iter()
            .map(|m| PendingMovieWithoutSims {
                movie_id: m.movie_id,
                i_idx: m.i_idx.unwrap(),
                title: m.title.clone(),
                ratings_count: m.rating_stats.count,
            })
            .collect())
    }

    async fn unbuilt_indices(&self, min_ratings: i64) -> AppResult<Vec<i64>> {
        let inner = self.inner.lock().unwrap();
        let mut indices: Vec<i64> = inner
            .movies
            .iter()
            .filter(|m| m.rating_stats.count >= min_ratings)
            .filter_map(|m| m.i_idx)
            .filter(|idx| !inner.built.contains(idx))
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    async fn max_item_index(&self) -> AppResult<Option<i64>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .movies
            .iter()
            .filter_map(|m| m.i_idx)
            .max())
    }

    async fn assign_index(&self, movie_id: i64, i_idx: i64) -> AppResult<()> {
        if let Some(movie) = self
            .inner
            .lock()
            .unwrap()
            .movies
            .iter_mut()
            .find(|m| m.movie_id == movie_id && m.i_idx.is_none())
        {
            movie.i_idx = Some(i_idx);
        }
        Ok(())
    }
}

// ----- TCP helpers -----

/// Starts a real worker on an ephemeral port and returns its address
pub async fn spawn_worker(
    node_id: &str,
    neighbors: Arc<dyn NeighborStore>,
    ratings: Arc<dyn RatingStore>,
) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let ctx = Arc::new(WorkerContext {
        node_id: node_id.to_string(),
        neighbors,
        ratings,
    });
    tokio::spawn(async move {
        let _ = worker::serve(listener, ctx).await;
    });

    addr
}

/// A listener that accepts connections and never answers; models a
/// hung worker that only the fan-out deadline can get rid of
pub async fn spawn_silent_listener() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            if let Ok((conn, _)) = listener.accept().await {
                held.push(conn);
            }
        }
    });

    addr
}

/// An address nothing listens on: connections are refused immediately
pub async fn dead_addr() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}
