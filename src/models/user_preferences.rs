use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Genre label to affinity weight
pub type GenreWeights = HashMap<String, f64>;

/// Per-user signals consumed by the recommendation engine
///
/// Favourite and disliked genres are explicit user input and may overlap.
/// `genre_weights` is derived from borrow history and written back by the
/// recommender; it is not validated when read back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    pub user_id: i64,
    pub favourite_genres: BTreeSet<String>,
    pub disliked_genres: BTreeSet<String>,
    pub genre_weights: GenreWeights,
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    /// Creates empty preferences for a user
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            favourite_genres: BTreeSet::new(),
            disliked_genres: BTreeSet::new(),
            genre_weights: GenreWeights::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_favourite(&self, genre: &str) -> bool {
        self.favourite_genres.contains(genre)
    }

    pub fn is_disliked(&self, genre: &str) -> bool {
        self.disliked_genres.contains(genre)
    }
}

/// Normalizes explicitly submitted genre labels
///
/// Labels are trimmed, blanks are dropped and duplicates collapse.
/// Overlap between favourite and disliked lists is left untouched.
pub fn normalize_genres<I, S>(genres: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    genres
        .into_iter()
        .map(|g| g.as_ref().trim().to_string())
        .filter(|g| !g.is_empty())
        .collect()
}

/// Request body for updating explicit genre preferences
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePreferencesRequest {
    #[serde(default)]
    pub favourite_genres: Vec<String>,
    #[serde(default)]
    pub disliked_genres: Vec<String>,
}
