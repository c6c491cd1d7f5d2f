use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum BorrowStatus {
    Active,
    Returned,
}

/// A user's loan of a book. Returned loans are kept as history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Borrow {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub status: BorrowStatus,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// A reader review; ratings are 1 to 5
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub rating: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;
pub const MIN_REVIEW_BODY_CHARS: usize = 10;

#[derive(Debug, Clone)]
pub struct NewReview {
    pub user_id: i64,
    pub book_id: i64,
    pub rating: i32,
    pub body: String,
}

impl NewReview {
    /// Checks rating bounds and body length
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(format!(
                "Rating must be between {} and {}",
                MIN_RATING, MAX_RATING
            ));
        }
        if self.body.trim().chars().count() < MIN_REVIEW_BODY_CHARS {
            return Err(format!(
                "Review body must be at least {} characters",
                MIN_REVIEW_BODY_CHARS
            ));
        }
        Ok(())
    }
}

/// Average rating over a set of reviews, 0.0 when there are none
pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    reviews.iter().map(|r| r.rating as f64).sum::<f64>() / reviews.len() as f64
}
