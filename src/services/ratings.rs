use std::sync::Arc;

use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::store::{CatalogStore, RatingStore};

/// Valid rating range (half-star steps in the catalog's scale)
pub const MIN_RATING: f64 = 0.5;
pub const MAX_RATING: f64 = 5.0;

/// Writes ratings and keeps the catalog's rolling rating stats
/// consistent with them.
pub struct RatingService {
    ratings: Arc<dyn RatingStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl RatingService {
    pub fn new(ratings: Arc<dyn RatingStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { ratings, catalog }
    }

    /// Upserts one rating and folds the change into the movie's
    /// rolling average. The count only grows on a first-time rating;
    /// an overwrite swaps the old value out of the running total.
    pub async fn add_or_update(&self, user_id: i64, movie_id: i64, rating: f64) -> AppResult<()> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(AppError::InvalidInput(format!(
                "rating {} outside [{}, {}]",
                rating, MIN_RATING, MAX_RATING
            )));
        }

        let prev = self.ratings.get_one(user_id, movie_id).await?;

        self.ratings.upsert(user_id, movie_id, rating).await?;

        let movie = self
            .catalog
            .get(movie_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("movie {} not found", movie_id)))?;

        let mut stats = movie.rating_stats;
        match prev {
            None => {
                let total = stats.average * stats.count as f64 + rating;
                stats.count += 1;
                stats.average = total / stats.count as f64;
            }
            Some(prev) => {
                if stats.count > 0 {
                    let total = stats.average * stats.count as f64 - prev.rating + rating;
                    stats.average = total / stats.count as f64;
                }
            }
        }
        stats.last_rated_at = Some(Utc::now());

        self.catalog.update_rating_stats(movie_id, &stats).await
    }
}
