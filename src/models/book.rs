use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Circulation status of a physical copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Borrowed,
}

/// Progress of the background LLM summary for a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SummaryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A book in the library catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub published_year: Option<i32>,
    /// Storage key of the uploaded content, never exposed to clients
    #[serde(skip_serializing)]
    pub file_key: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_review_consensus: Option<String>,
    pub summary_status: SummaryStatus,
    pub average_rating: f64,
    pub review_count: i32,
    pub status: BookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Genre label used for scoring lookups; books without a genre map to ""
    pub fn genre_label(&self) -> &str {
        self.genre.as_deref().unwrap_or("")
    }
}

/// Fields required to add a book to the catalog
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub published_year: Option<i32>,
    pub file_key: Option<String>,
}

/// Request body for adding a book; `content` is the plain-text book body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub published_year: Option<i32>,
    pub content: Option<String>,
}

/// Partial update of a book's descriptive fields
///
/// Nullable fields are doubly optional: `None` leaves the column alone and
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub genre: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub published_year: Option<Option<i32>>,
}

/// Maps a present JSON value, `null` included, to `Some`
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl BookUpdate {
    pub fn apply(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if let Some(description) = self.description {
            book.description = description;
        }
        if let Some(genre) = self.genre {
            book.genre = genre;
        }
        if let Some(published_year) = self.published_year {
            book.published_year = published_year;
        }
    }
}

/// AI analysis of a book as returned by the analysis endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookAnalysis {
    pub book_id: i64,
    pub ai_summary: Option<String>,
    pub ai_review_consensus: Option<String>,
    pub average_rating: f64,
    pub review_count: i32,
}

impl From<&Book> for BookAnalysis {
    fn from(book: &Book) -> Self {
        Self {
            book_id: book.id,
            ai_summary: book.ai_summary.clone(),
            ai_review_consensus: book.ai_review_consensus.clone(),
            average_rating: book.average_rating,
            review_count: book.review_count,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_book(id: i64, genre: Option<&str>, average_rating: f64) -> Book {
    let now = Utc::now();
    Book {
        id,
        title: format!("Book {}", id),
        author: "Test Author".to_string(),
        description: None,
        genre: genre.map(str::to_string),
        published_year: None,
        file_key: None,
        ai_summary: None,
        ai_review_consensus: None,
        summary_status: SummaryStatus::Pending,
        average_rating,
        review_count: 0,
        status: BookStatus::Available,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_label_defaults_to_empty() {
        assert_eq!(sample_book(1, None, 0.0).genre_label(), "");
        assert_eq!(sample_book(1, Some("Horror"), 0.0).genre_label(), "Horror");
    }

    #[test]
    fn test_book_update_only_touches_given_fields() {
        let mut book = sample_book(1, Some("Horror"), 3.0);
        BookUpdate {
            title: Some("Renamed".to_string()),
            genre: Some(Some("Mystery".to_string())),
            ..Default::default()
        }
        .apply(&mut book);

        assert_eq!(book.title, "Renamed");
        assert_eq!(book.genre.as_deref(), Some("Mystery"));
        assert_eq!(book.author, "Test Author");
    }

    #[test]
    fn test_book_update_distinguishes_null_from_absent() {
        let update: BookUpdate =
            serde_json::from_str(r#"{"genre": null, "published_year": 1965}"#).unwrap();
        assert_eq!(update.genre, Some(None));
        assert_eq!(update.published_year, Some(Some(1965)));
        assert_eq!(update.description, None);

        let mut book = sample_book(1, Some("Sci-Fi"), 0.0);
        book.description = Some("Kept".to_string());
        update.apply(&mut book);

        assert!(book.genre.is_none());
        assert_eq!(book.published_year, Some(1965));
        assert_eq!(book.description.as_deref(), Some("Kept"));
    }

    #[test]
    fn test_file_key_not_serialized() {
        let mut book = sample_book(7, None, 0.0);
        book.file_key = Some("books/secret.txt".to_string());
        let json = serde_json::to_value(&book).unwrap();
        assert!(json.get("file_key").is_none());
        assert_eq!(json["summary_status"], "pending");
        assert_eq!(json["status"], "available");
    }
}
