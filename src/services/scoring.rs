use std::cmp::Ordering;

use crate::models::{Book, GenreWeights, UserPreferences};

pub const FAVOURITE_BOOST: f64 = 0.5;
pub const DISLIKED_PENALTY: f64 = 0.5;
pub const RATING_FACTOR: f64 = 0.1;

/// Content-based score for a single book
///
/// `weight(genre) + 0.5 if favourite - 0.5 if disliked + 0.1 * rating`.
/// The favourite and disliked terms are independent, so a genre in both
/// sets nets zero. Weights are used as given and the total is not
/// normalized.
pub fn score_book(book: &Book, weights: &GenreWeights, preferences: Option<&UserPreferences>) -> f64 {
    let genre = book.genre_label();
    let mut score = weights.get(genre).copied().unwrap_or(0.0);

    if let Some(prefs) = preferences {
        if prefs.is_favourite(genre) {
            score += FAVOURITE_BOOST;
        }
        if prefs.is_disliked(genre) {
            score -= DISLIKED_PENALTY;
        }
    }

    score + RATING_FACTOR * book.average_rating
}

/// Scores every candidate, preserving candidate order
pub fn score_books(
    books: Vec<Book>,
    weights: &GenreWeights,
    preferences: Option<&UserPreferences>,
) -> Vec<(Book, f64)> {
    books
        .into_iter()
        .map(|book| {
            let score = score_book(&book, weights, preferences);
            (book, score)
        })
        .collect()
}

/// Sorts scored books by descending score
///
/// The sort is stable: equal scores keep their candidate order.
pub fn rank(mut scored: Vec<(Book, f64)>) -> Vec<Book> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(book, _)| book).collect()
}

/// Sorts books by descending average rating, stable on ties
pub fn rank_by_rating(mut books: Vec<Book>) -> Vec<Book> {
    books.sort_by(|a, b| {
        b.average_rating
            .partial_cmp(&a.average_rating)
            .unwrap_or(Ordering::Equal)
    });
    books
}
