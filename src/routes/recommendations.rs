use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{error::AppResult, models::Recommendations, services::RecommendationEngine};

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    limit: Option<i64>,
}

/// Handler for the recommendations endpoint
///
/// `limit` falls back to the configured default and is otherwise passed
/// through unchanged.
pub async fn recommend(
    State(engine): State<RecommendationEngine>,
    Path(user_id): Path<i64>,
    Query(params): Query<RecommendationQuery>,
) -> AppResult<Json<Recommendations>> {
    let limit = params.limit.unwrap_or_else(|| engine.default_limit());
    let recommendations = engine.recommend(user_id, limit).await?;
    Ok(Json(recommendations))
}
