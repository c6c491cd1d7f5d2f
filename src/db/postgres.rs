use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use std::collections::BTreeSet;

use crate::{
    db::stores::{BookStore, BorrowStore, PreferenceStore, ReviewStore},
    error::{AppError, AppResult},
    models::{
        Book, BookStatus, BookUpdate, Borrow, GenreWeights, NewBook, NewReview, Review,
        SummaryStatus, UserPreferences,
    },
};

const BOOK_COLUMNS: &str = "id, title, author, description, genre, published_year, file_key, \
     ai_summary, ai_review_consensus, summary_status, average_rating, review_count, status, \
     created_at, updated_at";

const BORROW_COLUMNS: &str = "id, user_id, book_id, status, borrowed_at, returned_at";

const PREFERENCE_COLUMNS: &str =
    "user_id, favourite_genres, disliked_genres, genre_weights, updated_at";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Postgres implementation of every store capability
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    user_id: i64,
    favourite_genres: Vec<String>,
    disliked_genres: Vec<String>,
    genre_weights: Json<GenreWeights>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PreferencesRow> for UserPreferences {
    fn from(row: PreferencesRow) -> Self {
        Self {
            user_id: row.user_id,
            favourite_genres: row.favourite_genres.into_iter().collect(),
            disliked_genres: row.disliked_genres.into_iter().collect(),
            genre_weights: row.genre_weights.0,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl BookStore for PgStore {
    async fn list_excluding(&self, excluded_ids: &[i64]) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE NOT (id = ANY($1)) ORDER BY id",
            BOOK_COLUMNS
        ))
        .bind(excluded_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn get(&self, id: i64) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(book)
    }

    async fn list_page(&self, offset: i64, limit: i64) -> AppResult<(Vec<Book>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books ORDER BY created_at DESC, id DESC OFFSET $1 LIMIT $2",
            BOOK_COLUMNS
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok((books, total))
    }

    async fn create(&self, book: NewBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, description, genre, published_year, file_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(book.title)
        .bind(book.author)
        .bind(book.description)
        .bind(book.genre)
        .bind(book.published_year)
        .bind(book.file_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn update(&self, id: i64, update: BookUpdate) -> AppResult<Option<Book>> {
        let updated = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                genre = CASE WHEN $6 THEN $7 ELSE genre END,
                published_year = CASE WHEN $8 THEN $9 ELSE published_year END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(update.title)
        .bind(update.author)
        .bind(update.description.is_some())
        .bind(update.description.flatten())
        .bind(update.genre.is_some())
        .bind(update.genre.flatten())
        .bind(update.published_year.is_some())
        .bind(update.published_year.flatten())
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_summary(
        &self,
        id: i64,
        status: SummaryStatus,
        summary: Option<String>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE books
            SET summary_status = $2, ai_summary = COALESCE($3, ai_summary), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(summary)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_review_stats(&self, id: i64, average_rating: f64, count: i32) -> AppResult<()> {
        sqlx::query(
            "UPDATE books SET average_rating = $2, review_count = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(average_rating)
        .bind(count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_review_consensus(&self, id: i64, consensus: String) -> AppResult<()> {
        sqlx::query(
            "UPDATE books SET ai_review_consensus = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(consensus)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl BorrowStore for PgStore {
    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Borrow>> {
        let borrows = sqlx::query_as::<_, Borrow>(&format!(
            "SELECT {} FROM borrows WHERE user_id = $1 ORDER BY id",
            BORROW_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(borrows)
    }

    async fn list_borrowed_books_by_user(&self, user_id: i64) -> AppResult<Vec<Book>> {
        let columns = BOOK_COLUMNS
            .split(", ")
            .map(|c| format!("b.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");

        let books = sqlx::query_as::<_, Book>(&format!(
            r#"
            SELECT {}
            FROM books b
            JOIN borrows br ON br.book_id = b.id
            WHERE br.user_id = $1
            ORDER BY br.id
            "#,
            columns
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn list_active_by_user(&self, user_id: i64) -> AppResult<Vec<Borrow>> {
        let borrows = sqlx::query_as::<_, Borrow>(&format!(
            "SELECT {} FROM borrows WHERE user_id = $1 AND status = 'active' \
             ORDER BY borrowed_at DESC, id DESC",
            BORROW_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(borrows)
    }

    async fn find_active(&self, user_id: i64, book_id: i64) -> AppResult<Option<Borrow>> {
        let borrow = sqlx::query_as::<_, Borrow>(&format!(
            "SELECT {} FROM borrows WHERE user_id = $1 AND book_id = $2 AND status = 'active'",
            BORROW_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(borrow)
    }

    async fn borrow(&self, user_id: i64, book_id: i64) -> AppResult<Borrow> {
        let mut tx = self.pool.begin().await?;

        let status: Option<BookStatus> =
            sqlx::query_scalar("SELECT status FROM books WHERE id = $1 FOR UPDATE")
                .bind(book_id)
                .fetch_optional(&mut *tx)
                .await?;

        match status {
            None => return Err(AppError::NotFound("Book not found".to_string())),
            Some(BookStatus::Borrowed) => {
                return Err(AppError::Conflict("Book is currently borrowed".to_string()))
            }
            Some(BookStatus::Available) => {}
        }

        let borrow = sqlx::query_as::<_, Borrow>(&format!(
            "INSERT INTO borrows (user_id, book_id) VALUES ($1, $2) RETURNING {}",
            BORROW_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE books SET status = 'borrowed', updated_at = NOW() WHERE id = $1")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(borrow)
    }

    async fn return_book(&self, user_id: i64, book_id: i64) -> AppResult<Borrow> {
        let mut tx = self.pool.begin().await?;

        let active_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM borrows
            WHERE user_id = $1 AND book_id = $2 AND status = 'active'
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(borrow_id) = active_id else {
            return Err(AppError::NotFound(
                "No active borrow found for this book".to_string(),
            ));
        };

        let borrow = sqlx::query_as::<_, Borrow>(&format!(
            "UPDATE borrows SET status = 'returned', returned_at = NOW() WHERE id = $1 RETURNING {}",
            BORROW_COLUMNS
        ))
        .bind(borrow_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE books SET status = 'available', updated_at = NOW() WHERE id = $1")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(borrow)
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn create(&self, review: NewReview) -> AppResult<Review> {
        let created = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (user_id, book_id, rating, body)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, book_id, rating, body, created_at
            "#,
        )
        .bind(review.user_id)
        .bind(review.book_id)
        .bind(review.rating)
        .bind(review.body)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn list_by_book(&self, book_id: i64) -> AppResult<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT id, user_id, book_id, rating, body, created_at
            FROM reviews WHERE book_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reviews)
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn get_by_user(&self, user_id: i64) -> AppResult<Option<UserPreferences>> {
        let row = sqlx::query_as::<_, PreferencesRow>(&format!(
            "SELECT {} FROM user_preferences WHERE user_id = $1",
            PREFERENCE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserPreferences::from))
    }

    async fn upsert_genre_weights(&self, user_id: i64, weights: &GenreWeights) -> AppResult<()> {
        // One statement: concurrent writers resolve last-write-wins
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, genre_weights)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET genre_weights = EXCLUDED.genre_weights, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(Json(weights))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_explicit(
        &self,
        user_id: i64,
        favourite_genres: BTreeSet<String>,
        disliked_genres: BTreeSet<String>,
    ) -> AppResult<UserPreferences> {
        let favourites: Vec<String> = favourite_genres.into_iter().collect();
        let disliked: Vec<String> = disliked_genres.into_iter().collect();

        let row = sqlx::query_as::<_, PreferencesRow>(&format!(
            r#"
            INSERT INTO user_preferences (user_id, favourite_genres, disliked_genres)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET favourite_genres = EXCLUDED.favourite_genres,
                disliked_genres = EXCLUDED.disliked_genres,
                updated_at = NOW()
            RETURNING {}
            "#,
            PREFERENCE_COLUMNS
        ))
        .bind(user_id)
        .bind(favourites)
        .bind(disliked)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}
