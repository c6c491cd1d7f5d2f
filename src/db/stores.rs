/// Persistence capabilities used by the services
///
/// Each store is an object-safe async trait so the Postgres implementation
/// and the in-memory implementation used by tests are interchangeable behind
/// an `Arc<dyn ...>`.
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::collections::BTreeSet;

use crate::{
    error::AppResult,
    models::{
        Book, BookUpdate, Borrow, GenreWeights, NewBook, NewReview, Review, SummaryStatus,
        UserPreferences,
    },
};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    /// All books whose id is not in `excluded_ids`, ordered by ascending id
    async fn list_excluding(&self, excluded_ids: &[i64]) -> AppResult<Vec<Book>>;

    async fn get(&self, id: i64) -> AppResult<Option<Book>>;

    /// Newest books first, with the total catalog size
    async fn list_page(&self, offset: i64, limit: i64) -> AppResult<(Vec<Book>, i64)>;

    async fn create(&self, book: NewBook) -> AppResult<Book>;

    async fn update(&self, id: i64, update: BookUpdate) -> AppResult<Option<Book>>;

    /// Returns false when the book did not exist
    async fn delete(&self, id: i64) -> AppResult<bool>;

    async fn set_summary(
        &self,
        id: i64,
        status: SummaryStatus,
        summary: Option<String>,
    ) -> AppResult<()>;

    async fn set_review_stats(&self, id: i64, average_rating: f64, count: i32)
        -> AppResult<()>;

    async fn set_review_consensus(&self, id: i64, consensus: String) -> AppResult<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BorrowStore: Send + Sync {
    /// Every borrow record of the user, active and returned
    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Borrow>>;

    /// The book behind each of the user's borrow records, one entry per record
    async fn list_borrowed_books_by_user(&self, user_id: i64) -> AppResult<Vec<Book>>;

    /// Active borrows, most recent first
    async fn list_active_by_user(&self, user_id: i64) -> AppResult<Vec<Borrow>>;

    async fn find_active(&self, user_id: i64, book_id: i64) -> AppResult<Option<Borrow>>;

    /// Opens a loan and marks the book borrowed in one unit of work
    ///
    /// Fails with `NotFound` for an unknown book and `Conflict` when the
    /// book is already out.
    async fn borrow(&self, user_id: i64, book_id: i64) -> AppResult<Borrow>;

    /// Closes the user's active loan and makes the book available again
    async fn return_book(&self, user_id: i64, book_id: i64) -> AppResult<Borrow>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn create(&self, review: NewReview) -> AppResult<Review>;

    async fn list_by_book(&self, book_id: i64) -> AppResult<Vec<Review>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_by_user(&self, user_id: i64) -> AppResult<Option<UserPreferences>>;

    /// Atomically creates or overwrites the user's genre weights
    async fn upsert_genre_weights(&self, user_id: i64, weights: &GenreWeights) -> AppResult<()>;

    /// Atomically creates or overwrites the explicit genre lists
    async fn upsert_explicit(
        &self,
        user_id: i64,
        favourite_genres: BTreeSet<String>,
        disliked_genres: BTreeSet<String>,
    ) -> AppResult<UserPreferences>;
}
