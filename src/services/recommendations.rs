use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::instrument;

use crate::{
    db::{BookStore, BorrowStore, PreferenceStore},
    error::AppResult,
    models::{Book, GenreWeights, Recommendations, Strategy},
    services::{genre_weights, scoring},
};

/// Users with fewer borrow records than this get top-rated books
pub const COLD_START_THRESHOLD: usize = 2;

/// Generates personalized book recommendations
///
/// Strategy precedence for each call:
/// 1. `no_books_available` when every book has a borrow record for the user
/// 2. `cold_start_top_rated` with fewer than two borrow records
/// 3. `content_based` when stored or estimated genre weights are non-empty;
///    the weights are written back to the preference store after ranking
/// 4. `fallback_top_rated` when the history carries no genre data
///
/// Any book the user has ever borrowed, returned or not, is excluded.
#[derive(Clone)]
pub struct RecommendationEngine {
    books: Arc<dyn BookStore>,
    borrows: Arc<dyn BorrowStore>,
    preferences: Arc<dyn PreferenceStore>,
    default_limit: i64,
}

impl RecommendationEngine {
    pub fn new(
        books: Arc<dyn BookStore>,
        borrows: Arc<dyn BorrowStore>,
        preferences: Arc<dyn PreferenceStore>,
        default_limit: i64,
    ) -> Self {
        Self {
            books,
            borrows,
            preferences,
            default_limit,
        }
    }

    pub fn default_limit(&self) -> i64 {
        self.default_limit
    }

    /// Recommends up to `limit` books for `user_id`
    ///
    /// `limit` is not validated and follows slice semantics: zero returns
    /// nothing and a negative value drops that many entries from the end.
    /// Storage failures, including the weight write-back, are propagated.
    #[instrument(skip(self))]
    pub async fn recommend(&self, user_id: i64, limit: i64) -> AppResult<Recommendations> {
        let history = self.borrows.list_by_user(user_id).await?;
        let borrowed_ids: Vec<i64> = history
            .iter()
            .map(|b| b.book_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let preferences = self.preferences.get_by_user(user_id).await?;
        let candidates = self.books.list_excluding(&borrowed_ids).await?;

        if candidates.is_empty() {
            return Ok(finish(user_id, Vec::new(), Strategy::NoBooksAvailable));
        }

        if history.len() < COLD_START_THRESHOLD {
            let books = apply_limit(scoring::rank_by_rating(candidates), limit);
            return Ok(finish(user_id, books, Strategy::ColdStartTopRated));
        }

        let mut weights: GenreWeights = preferences
            .as_ref()
            .map(|p| p.genre_weights.clone())
            .unwrap_or_default();

        if weights.is_empty() {
            weights = genre_weights::estimate_for_user(self.borrows.as_ref(), user_id).await?;
        }

        if !weights.is_empty() {
            let scored = scoring::score_books(candidates, &weights, preferences.as_ref());
            let books = apply_limit(scoring::rank(scored), limit);

            self.preferences
                .upsert_genre_weights(user_id, &weights)
                .await?;

            return Ok(finish(user_id, books, Strategy::ContentBased));
        }

        let books = apply_limit(scoring::rank_by_rating(candidates), limit);
        Ok(finish(user_id, books, Strategy::FallbackTopRated))
    }
}

fn finish(user_id: i64, books: Vec<Book>, strategy: Strategy) -> Recommendations {
    tracing::info!(
        user_id,
        strategy = %strategy,
        count = books.len(),
        "Recommendations generated"
    );
    Recommendations { books, strategy }
}

/// Truncates like a slice `[..limit]` where negative limits count from the end
pub fn apply_limit<T>(mut items: Vec<T>, limit: i64) -> Vec<T> {
    let len = items.len() as i64;
    let end = if limit >= 0 {
        limit.min(len)
    } else {
        (len + limit).max(0)
    };
    items.truncate(end as usize);
    items
}
