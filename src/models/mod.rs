use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod book;
pub mod borrow;
pub mod user_preferences;

pub use book::{
    Book, BookAnalysis, BookStatus, BookUpdate, CreateBookRequest, NewBook, SummaryStatus,
};
pub use borrow::{average_rating, Borrow, BorrowStatus, NewReview, Review};
pub use user_preferences::{
    normalize_genres, GenreWeights, UpdatePreferencesRequest, UserPreferences,
};

/// Recommendation branch taken for a call
///
/// The serialized labels are part of the public response contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NoBooksAvailable,
    ColdStartTopRated,
    ContentBased,
    FallbackTopRated,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NoBooksAvailable => "no_books_available",
            Strategy::ColdStartTopRated => "cold_start_top_rated",
            Strategy::ContentBased => "content_based",
            Strategy::FallbackTopRated => "fallback_top_rated",
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ranked books together with the strategy that produced them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendations {
    pub books: Vec<Book>,
    pub strategy: Strategy,
}

/// One page of the catalog
#[derive(Debug, Serialize)]
pub struct PaginatedBooks {
    pub items: Vec<Book>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}
