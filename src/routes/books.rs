use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{
        Book, BookAnalysis, BookUpdate, Borrow, CreateBookRequest, NewReview, PaginatedBooks,
        Review,
    },
    services::{library::DEFAULT_PAGE_SIZE, LibraryService},
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<i64>,
    page_size: Option<i64>,
}

/// Identifies the acting reader for circulation requests
#[derive(Debug, Deserialize)]
pub struct ReaderRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub user_id: i64,
    pub rating: i32,
    pub body: String,
}

pub async fn create(
    State(library): State<LibraryService>,
    Json(request): Json<CreateBookRequest>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = library.create_book(request).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn list(
    State(library): State<LibraryService>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<PaginatedBooks>> {
    let page = library
        .list_books(
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page))
}

pub async fn get(
    State(library): State<LibraryService>,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    Ok(Json(library.get_book(id).await?))
}

pub async fn update(
    State(library): State<LibraryService>,
    Path(id): Path<i64>,
    Json(update): Json<BookUpdate>,
) -> AppResult<Json<Book>> {
    Ok(Json(library.update_book(id, update).await?))
}

pub async fn delete(
    State(library): State<LibraryService>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    library.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn borrow(
    State(library): State<LibraryService>,
    Path(id): Path<i64>,
    Json(request): Json<ReaderRequest>,
) -> AppResult<(StatusCode, Json<Borrow>)> {
    let borrow = library.borrow_book(request.user_id, id).await?;
    Ok((StatusCode::CREATED, Json(borrow)))
}

pub async fn return_book(
    State(library): State<LibraryService>,
    Path(id): Path<i64>,
    Json(request): Json<ReaderRequest>,
) -> AppResult<Json<Borrow>> {
    Ok(Json(library.return_book(request.user_id, id).await?))
}

pub async fn add_review(
    State(library): State<LibraryService>,
    Path(id): Path<i64>,
    Json(request): Json<ReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    let review = library
        .add_review(NewReview {
            user_id: request.user_id,
            book_id: id,
            rating: request.rating,
            body: request.body,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn analysis(
    State(library): State<LibraryService>,
    Path(id): Path<i64>,
) -> AppResult<Json<BookAnalysis>> {
    Ok(Json(library.analysis(id).await?))
}
