/// Catalog, circulation, review and preference operations
///
/// Thin coordination layer between the HTTP handlers, the stores and the
/// background task queue. Anything slow (LLM work) is queued, never awaited.
use std::sync::Arc;
use tracing::instrument;

use crate::{
    cached,
    db::{BookStore, BorrowStore, Cache, CacheKey, PreferenceStore, ReviewStore},
    error::{AppError, AppResult},
    models::{
        normalize_genres, Book, BookAnalysis, BookUpdate, Borrow, CreateBookRequest, NewBook,
        NewReview, PaginatedBooks, Review, UpdatePreferencesRequest, UserPreferences,
    },
    services::{
        storage::FileStore,
        tasks::{BackgroundTask, TaskQueue},
    },
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct LibraryService {
    books: Arc<dyn BookStore>,
    borrows: Arc<dyn BorrowStore>,
    reviews: Arc<dyn ReviewStore>,
    preferences: Arc<dyn PreferenceStore>,
    files: Arc<dyn FileStore>,
    tasks: TaskQueue,
    cache: Option<Cache>,
    analysis_cache_ttl: u64,
}

impl LibraryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        books: Arc<dyn BookStore>,
        borrows: Arc<dyn BorrowStore>,
        reviews: Arc<dyn ReviewStore>,
        preferences: Arc<dyn PreferenceStore>,
        files: Arc<dyn FileStore>,
        tasks: TaskQueue,
        cache: Option<Cache>,
        analysis_cache_ttl: u64,
    ) -> Self {
        Self {
            books,
            borrows,
            reviews,
            preferences,
            files,
            tasks,
            cache,
            analysis_cache_ttl,
        }
    }

    /// Adds a book, storing its content and queueing the summary task
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_book(&self, request: CreateBookRequest) -> AppResult<Book> {
        let title = request.title.trim().to_string();
        let author = request.author.trim().to_string();
        if title.is_empty() || author.is_empty() {
            return Err(AppError::InvalidInput(
                "Title and author must not be empty".to_string(),
            ));
        }

        let file_key = match request.content.as_deref() {
            Some(content) if !content.trim().is_empty() => {
                Some(self.files.put(content.as_bytes(), "content.txt").await?)
            }
            _ => None,
        };

        let new_book = NewBook {
            title,
            author,
            description: request.description,
            genre: request.genre.map(|g| g.trim().to_string()).filter(|g| !g.is_empty()),
            published_year: request.published_year,
            file_key: file_key.clone(),
        };

        let book = match self.books.create(new_book).await {
            Ok(book) => book,
            Err(e) => {
                if let Some(key) = &file_key {
                    if let Err(cleanup) = self.files.delete(key).await {
                        tracing::warn!(error = %cleanup, key = %key, "Failed to remove orphaned content");
                    }
                }
                return Err(e);
            }
        };

        if book.file_key.is_some() {
            self.tasks
                .enqueue(BackgroundTask::GenerateSummary { book_id: book.id });
        }

        tracing::info!(book_id = book.id, "Book created");
        Ok(book)
    }

    /// Returns one page of the catalog, newest first
    pub async fn list_books(&self, page: i64, page_size: i64) -> AppResult<PaginatedBooks> {
        if page < 1 {
            return Err(AppError::InvalidInput("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::InvalidInput(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let offset = page
            .checked_sub(1)
            .and_then(|p| p.checked_mul(page_size))
            .ok_or_else(|| AppError::InvalidInput("page is out of range".to_string()))?;

        let (items, total) = self.books.list_page(offset, page_size).await?;

        Ok(PaginatedBooks {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn get_book(&self, id: i64) -> AppResult<Book> {
        self.books
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
    }

    pub async fn update_book(&self, id: i64, update: BookUpdate) -> AppResult<Book> {
        if matches!(&update.title, Some(t) if t.trim().is_empty())
            || matches!(&update.author, Some(a) if a.trim().is_empty())
        {
            return Err(AppError::InvalidInput(
                "Title and author must not be empty".to_string(),
            ));
        }

        self.books
            .update(id, update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
    }

    /// Removes a book with its loans, reviews and stored content
    #[instrument(skip(self))]
    pub async fn delete_book(&self, id: i64) -> AppResult<()> {
        let book = self.get_book(id).await?;

        if !self.books.delete(id).await? {
            return Err(AppError::NotFound(format!("Book {} not found", id)));
        }

        if let Some(key) = &book.file_key {
            if let Err(e) = self.files.delete(key).await {
                tracing::warn!(error = %e, key = %key, "Failed to delete book content");
            }
        }

        if let Some(cache) = &self.cache {
            cache.invalidate(&CacheKey::BookAnalysis(id));
        }

        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn borrow_book(&self, user_id: i64, book_id: i64) -> AppResult<Borrow> {
        let borrow = self.borrows.borrow(user_id, book_id).await?;
        tracing::info!(user_id, book_id, "Book borrowed");
        Ok(borrow)
    }

    #[instrument(skip(self))]
    pub async fn return_book(&self, user_id: i64, book_id: i64) -> AppResult<Borrow> {
        let borrow = self.borrows.return_book(user_id, book_id).await?;
        tracing::info!(user_id, book_id, "Book returned");
        Ok(borrow)
    }

    pub async fn active_borrows(&self, user_id: i64) -> AppResult<Vec<Borrow>> {
        self.borrows.list_active_by_user(user_id).await
    }

    /// Records a review from a reader currently holding the book
    ///
    /// An active borrow implies the book exists, so an unknown book is
    /// rejected as forbidden rather than not found.
    #[instrument(skip(self, review), fields(user_id = review.user_id, book_id = review.book_id))]
    pub async fn add_review(&self, review: NewReview) -> AppResult<Review> {
        if self
            .borrows
            .find_active(review.user_id, review.book_id)
            .await?
            .is_none()
        {
            return Err(AppError::Forbidden(
                "You can only review books you are currently borrowing".to_string(),
            ));
        }

        review.validate().map_err(AppError::InvalidInput)?;

        let created = self.reviews.create(review).await?;
        self.tasks.enqueue(BackgroundTask::UpdateReviewConsensus {
            book_id: created.book_id,
        });

        Ok(created)
    }

    /// AI summary, review consensus and rating stats, cached when Redis is on
    pub async fn analysis(&self, book_id: i64) -> AppResult<BookAnalysis> {
        cached!(
            self.cache,
            CacheKey::BookAnalysis(book_id),
            self.analysis_cache_ttl,
            async {
                let book = self.get_book(book_id).await?;
                Ok::<_, AppError>(BookAnalysis::from(&book))
            }
        )
    }

    /// Stored preferences, or empty ones for a user who never set any
    pub async fn preferences(&self, user_id: i64) -> AppResult<UserPreferences> {
        Ok(self
            .preferences
            .get_by_user(user_id)
            .await?
            .unwrap_or_else(|| UserPreferences::new(user_id)))
    }

    /// Replaces the explicit favourite and disliked genre lists
    #[instrument(skip(self, request))]
    pub async fn update_preferences(
        &self,
        user_id: i64,
        request: UpdatePreferencesRequest,
    ) -> AppResult<UserPreferences> {
        self.preferences
            .upsert_explicit(
                user_id,
                normalize_genres(&request.favourite_genres),
                normalize_genres(&request.disliked_genres),
            )
            .await
    }
}
