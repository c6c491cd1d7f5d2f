use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    db::stores::{BookStore, BorrowStore, PreferenceStore, ReviewStore},
    error::{AppError, AppResult},
    models::{
        Book, BookStatus, BookUpdate, Borrow, BorrowStatus, GenreWeights, NewBook, NewReview,
        Review, SummaryStatus, UserPreferences,
    },
};

/// In-process store implementing every store capability
///
/// Used for local development without Postgres and by the test suites.
/// Books live in a `BTreeMap` so iteration follows ascending id, matching
/// the ordering guarantees of the Postgres store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    books: BTreeMap<i64, Book>,
    borrows: Vec<Borrow>,
    reviews: Vec<Review>,
    preferences: HashMap<i64, UserPreferences>,
    next_book_id: i64,
    next_borrow_id: i64,
    next_review_id: i64,
}

impl MemoryStore {
    /// Creates a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed book, keeping its id
    pub async fn insert_book(&self, book: Book) {
        let mut inner = self.inner.write().await;
        inner.next_book_id = inner.next_book_id.max(book.id);
        inner.books.insert(book.id, book);
    }

    /// Records a borrow without touching the book's status
    pub async fn insert_borrow(&self, user_id: i64, book_id: i64, status: BorrowStatus) -> Borrow {
        let mut inner = self.inner.write().await;
        inner.next_borrow_id += 1;
        let now = Utc::now();
        let borrow = Borrow {
            id: inner.next_borrow_id,
            user_id,
            book_id,
            status,
            borrowed_at: now,
            returned_at: (status == BorrowStatus::Returned).then_some(now),
        };
        inner.borrows.push(borrow.clone());
        borrow
    }

    pub async fn insert_preferences(&self, preferences: UserPreferences) {
        let mut inner = self.inner.write().await;
        inner.preferences.insert(preferences.user_id, preferences);
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn list_excluding(&self, excluded_ids: &[i64]) -> AppResult<Vec<Book>> {
        let inner = self.inner.read().await;
        Ok(inner
            .books
            .values()
            .filter(|b| !excluded_ids.contains(&b.id))
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> AppResult<Option<Book>> {
        let inner = self.inner.read().await;
        Ok(inner.books.get(&id).cloned())
    }

    async fn list_page(&self, offset: i64, limit: i64) -> AppResult<(Vec<Book>, i64)> {
        let inner = self.inner.read().await;
        let total = inner.books.len() as i64;
        let mut books: Vec<Book> = inner.books.values().cloned().collect();
        books.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let page = books
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn create(&self, book: NewBook) -> AppResult<Book> {
        let mut inner = self.inner.write().await;
        inner.next_book_id += 1;
        let now = Utc::now();
        let created = Book {
            id: inner.next_book_id,
            title: book.title,
            author: book.author,
            description: book.description,
            genre: book.genre,
            published_year: book.published_year,
            file_key: book.file_key,
            ai_summary: None,
            ai_review_consensus: None,
            summary_status: SummaryStatus::Pending,
            average_rating: 0.0,
            review_count: 0,
            status: BookStatus::Available,
            created_at: now,
            updated_at: now,
        };
        inner.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, update: BookUpdate) -> AppResult<Option<Book>> {
        let mut inner = self.inner.write().await;
        Ok(inner.books.get_mut(&id).map(|book| {
            update.apply(book);
            book.updated_at = Utc::now();
            book.clone()
        }))
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let existed = inner.books.remove(&id).is_some();
        if existed {
            inner.borrows.retain(|b| b.book_id != id);
            inner.reviews.retain(|r| r.book_id != id);
        }
        Ok(existed)
    }

    async fn set_summary(
        &self,
        id: i64,
        status: SummaryStatus,
        summary: Option<String>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(book) = inner.books.get_mut(&id) {
            book.summary_status = status;
            if summary.is_some() {
                book.ai_summary = summary;
            }
            book.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_review_stats(&self, id: i64, average_rating: f64, count: i32) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(book) = inner.books.get_mut(&id) {
            book.average_rating = average_rating;
            book.review_count = count;
            book.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_review_consensus(&self, id: i64, consensus: String) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(book) = inner.books.get_mut(&id) {
            book.ai_review_consensus = Some(consensus);
            book.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl BorrowStore for MemoryStore {
    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Borrow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .borrows
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_borrowed_books_by_user(&self, user_id: i64) -> AppResult<Vec<Book>> {
        let inner = self.inner.read().await;
        Ok(inner
            .borrows
            .iter()
            .filter(|b| b.user_id == user_id)
            .filter_map(|b| inner.books.get(&b.book_id))
            .cloned()
            .collect())
    }

    async fn list_active_by_user(&self, user_id: i64) -> AppResult<Vec<Borrow>> {
        let inner = self.inner.read().await;
        let mut active: Vec<Borrow> = inner
            .borrows
            .iter()
            .filter(|b| b.user_id == user_id && b.status == BorrowStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at).then(b.id.cmp(&a.id)));
        Ok(active)
    }

    async fn find_active(&self, user_id: i64, book_id: i64) -> AppResult<Option<Borrow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .borrows
            .iter()
            .find(|b| {
                b.user_id == user_id && b.book_id == book_id && b.status == BorrowStatus::Active
            })
            .cloned())
    }

    async fn borrow(&self, user_id: i64, book_id: i64) -> AppResult<Borrow> {
        let mut inner = self.inner.write().await;

        let book = inner
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        if book.status == BookStatus::Borrowed {
            return Err(AppError::Conflict("Book is currently borrowed".to_string()));
        }
        book.status = BookStatus::Borrowed;
        book.updated_at = Utc::now();

        inner.next_borrow_id += 1;
        let borrow = Borrow {
            id: inner.next_borrow_id,
            user_id,
            book_id,
            status: BorrowStatus::Active,
            borrowed_at: Utc::now(),
            returned_at: None,
        };
        inner.borrows.push(borrow.clone());
        Ok(borrow)
    }

    async fn return_book(&self, user_id: i64, book_id: i64) -> AppResult<Borrow> {
        let mut inner = self.inner.write().await;

        let borrow = inner
            .borrows
            .iter_mut()
            .find(|b| {
                b.user_id == user_id && b.book_id == book_id && b.status == BorrowStatus::Active
            })
            .ok_or_else(|| {
                AppError::NotFound("No active borrow found for this book".to_string())
            })?;
        borrow.status = BorrowStatus::Returned;
        borrow.returned_at = Some(Utc::now());
        let returned = borrow.clone();

        if let Some(book) = inner.books.get_mut(&book_id) {
            book.status = BookStatus::Available;
            book.updated_at = Utc::now();
        }
        Ok(returned)
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn create(&self, review: NewReview) -> AppResult<Review> {
        let mut inner = self.inner.write().await;
        inner.next_review_id += 1;
        let created = Review {
            id: inner.next_review_id,
            user_id: review.user_id,
            book_id: review.book_id,
            rating: review.rating,
            body: review.body,
            created_at: Utc::now(),
        };
        inner.reviews.push(created.clone());
        Ok(created)
    }

    async fn list_by_book(&self, book_id: i64) -> AppResult<Vec<Review>> {
        let inner = self.inner.read().await;
        Ok(inner
            .reviews
            .iter()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get_by_user(&self, user_id: i64) -> AppResult<Option<UserPreferences>> {
        let inner = self.inner.read().await;
        Ok(inner.preferences.get(&user_id).cloned())
    }

    async fn upsert_genre_weights(&self, user_id: i64, weights: &GenreWeights) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let prefs = inner
            .preferences
            .entry(user_id)
            .or_insert_with(|| UserPreferences::new(user_id));
        prefs.genre_weights = weights.clone();
        prefs.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_explicit(
        &self,
        user_id: i64,
        favourite_genres: BTreeSet<String>,
        disliked_genres: BTreeSet<String>,
    ) -> AppResult<UserPreferences> {
        let mut inner = self.inner.write().await;
        let prefs = inner
            .preferences
            .entry(user_id)
            .or_insert_with(|| UserPreferences::new(user_id));
        prefs.favourite_genres = favourite_genres;
        prefs.disliked_genres = disliked_genres;
        prefs.updated_at = Utc::now();
        Ok(prefs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::sample_book;

    #[tokio::test]
    async fn test_list_excluding_is_ordered_by_id() {
        let store = MemoryStore::new();
        for id in [3, 1, 2] {
            store.insert_book(sample_book(id, None, 0.0)).await;
        }

        let books = store.list_excluding(&[2]).await.unwrap();
        let ids: Vec<i64> = books.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_borrow_and_return_cycle() {
        let store = MemoryStore::new();
        store.insert_book(sample_book(1, None, 0.0)).await;

        let borrow = store.borrow(10, 1).await.unwrap();
        assert_eq!(borrow.status, BorrowStatus::Active);
        assert_eq!(
            store.get(1).await.unwrap().unwrap().status,
            BookStatus::Borrowed
        );

        let conflict = store.borrow(11, 1).await;
        assert!(matches!(conflict, Err(AppError::Conflict(_))));

        let returned = store.return_book(10, 1).await.unwrap();
        assert_eq!(returned.status, BorrowStatus::Returned);
        assert!(returned.returned_at.is_some());
        assert_eq!(
            store.get(1).await.unwrap().unwrap().status,
            BookStatus::Available
        );

        // history is kept after return
        assert_eq!(store.list_by_user(10).await.unwrap().len(), 1);
        assert!(store.list_active_by_user(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_borrow_unknown_book() {
        let store = MemoryStore::new();
        let result = store.borrow(1, 99).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_return_without_active_borrow() {
        let store = MemoryStore::new();
        store.insert_book(sample_book(1, None, 0.0)).await;
        let result = store.return_book(1, 1).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_borrowed_books_has_one_entry_per_borrow() {
        let store = MemoryStore::new();
        store.insert_book(sample_book(1, Some("Sci-Fi"), 0.0)).await;
        store.insert_borrow(5, 1, BorrowStatus::Returned).await;
        store.insert_borrow(5, 1, BorrowStatus::Active).await;
        store.insert_borrow(6, 1, BorrowStatus::Returned).await;

        let books = store.list_borrowed_books_by_user(5).await.unwrap();
        assert_eq!(books.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_genre_weights_creates_then_overwrites() {
        let store = MemoryStore::new();
        let first: GenreWeights = [("Horror".to_string(), 1.0)].into_iter().collect();
        store.upsert_genre_weights(1, &first).await.unwrap();

        let second: GenreWeights = [("Mystery".to_string(), 1.0)].into_iter().collect();
        store.upsert_genre_weights(1, &second).await.unwrap();

        let prefs = store.get_by_user(1).await.unwrap().unwrap();
        assert_eq!(prefs.genre_weights, second);
    }

    #[tokio::test]
    async fn test_upsert_explicit_keeps_weights() {
        let store = MemoryStore::new();
        let weights: GenreWeights = [("Horror".to_string(), 1.0)].into_iter().collect();
        store.upsert_genre_weights(1, &weights).await.unwrap();

        let favourites: BTreeSet<String> = ["Poetry".to_string()].into_iter().collect();
        let prefs = store
            .upsert_explicit(1, favourites.clone(), BTreeSet::new())
            .await
            .unwrap();

        assert_eq!(prefs.favourite_genres, favourites);
        assert_eq!(prefs.genre_weights, weights);
    }
}
