use tracing::instrument;

use crate::{
    db::BorrowStore,
    error::AppResult,
    models::{Book, GenreWeights},
};

/// Derives genre affinities from a borrow history
///
/// Each borrowed book with a non-empty genre adds one to that genre's count;
/// counts are then divided by their total so the result sums to 1. A book
/// borrowed twice counts twice. Books without a genre are ignored, so a
/// history with no genres yields an empty map.
pub fn compute_genre_weights(borrowed_books: &[Book]) -> GenreWeights {
    let mut counts = GenreWeights::new();
    for genre in borrowed_books
        .iter()
        .filter_map(|b| b.genre.as_deref())
        .filter(|g| !g.is_empty())
    {
        *counts.entry(genre.to_string()).or_insert(0.0) += 1.0;
    }

    let total: f64 = counts.values().sum();
    let total = if total == 0.0 { 1.0 } else { total };

    counts
        .into_iter()
        .map(|(genre, count)| (genre, count / total))
        .collect()
}

/// Loads the user's borrow history and computes their genre weights
#[instrument(skip(borrows))]
pub async fn estimate_for_user(borrows: &dyn BorrowStore, user_id: i64) -> AppResult<GenreWeights> {
    let borrowed_books = borrows.list_borrowed_books_by_user(user_id).await?;
    let weights = compute_genre_weights(&borrowed_books);

    tracing::debug!(
        borrowed = borrowed_books.len(),
        genres = weights.len(),
        "Estimated genre weights from borrow history"
    );

    Ok(weights)
}
