use axum::{
    http::{HeaderValue, Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    middleware::{make_span_with_request_id, request_id_middleware},
    state::AppState,
};

pub mod books;
pub mod recommendations;
pub mod users;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(books::list).post(books::create))
        .route(
            "/books/:id",
            get(books::get).put(books::update).delete(books::delete),
        )
        .route("/books/:id/borrow", post(books::borrow))
        .route("/books/:id/return", post(books::return_book))
        .route("/books/:id/reviews", post(books::add_review))
        .route("/books/:id/analysis", get(books::analysis))
        .route("/users/:user_id/borrows", get(users::borrows))
        .route(
            "/users/:user_id/preferences",
            get(users::get_preferences).put(users::update_preferences),
        )
        .route(
            "/users/:user_id/recommendations",
            get(recommendations::recommend),
        )
}

/// CORS restricted to the configured origins
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
