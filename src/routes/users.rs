use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{Borrow, UpdatePreferencesRequest, UserPreferences},
    services::LibraryService,
};

/// Active loans of a reader, most recent first
pub async fn borrows(
    State(library): State<LibraryService>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<Borrow>>> {
    Ok(Json(library.active_borrows(user_id).await?))
}

pub async fn get_preferences(
    State(library): State<LibraryService>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<UserPreferences>> {
    Ok(Json(library.preferences(user_id).await?))
}

pub async fn update_preferences(
    State(library): State<LibraryService>,
    Path(user_id): Path<i64>,
    Json(request): Json<UpdatePreferencesRequest>,
) -> AppResult<Json<UserPreferences>> {
    Ok(Json(library.update_preferences(user_id, request).await?))
}
