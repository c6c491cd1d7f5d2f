use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;

use lumina_api::{
    config::Config,
    create_router,
    db::MemoryStore,
    error::AppResult,
    services::{llm::LlmClient, storage::LocalFileStore},
    AppState, Backends,
};

/// Deterministic LLM stand-in
struct CannedLlm;

#[async_trait]
impl LlmClient for CannedLlm {
    async fn complete(&self, _system: &str, _user: &str, _max_tokens: u32) -> AppResult<String> {
        Ok("Canned completion.".to_string())
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

fn create_test_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let storage_root =
        std::env::temp_dir().join(format!("lumina-api-tests-{}", uuid::Uuid::new_v4()));

    let (state, _worker) = AppState::assemble(
        Backends {
            books: store.clone(),
            borrows: store.clone(),
            reviews: store.clone(),
            preferences: store,
            files: Arc::new(LocalFileStore::new(storage_root)),
            llm: Arc::new(CannedLlm),
            cache: None,
        },
        &Config::default(),
    );

    TestServer::new(create_router(state)).unwrap()
}

async fn create_book(server: &TestServer, title: &str, genre: Option<&str>) -> i64 {
    let response = server
        .post("/api/v1/books")
        .json(&json!({
            "title": title,
            "author": "Test Author",
            "genre": genre,
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server();
    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("trace-me-42"),
        )
        .await;
    assert_eq!(response.header("x-request-id"), "trace-me-42");
}

#[tokio::test]
async fn test_book_crud() {
    let server = create_test_server();

    let response = server
        .post("/api/v1/books")
        .json(&json!({
            "title": "The Left Hand of Darkness",
            "author": "Ursula K. Le Guin",
            "genre": "Sci-Fi",
            "published_year": 1969,
            "content": "The king was pregnant."
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["title"], "The Left Hand of Darkness");
    assert!(created.get("file_key").is_none());

    let response = server.get(&format!("/api/v1/books/{}", id)).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["genre"], "Sci-Fi");

    let response = server
        .put(&format!("/api/v1/books/{}", id))
        .json(&json!({ "description": "Winter on Gethen" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["description"], "Winter on Gethen");

    let response = server.get("/api/v1/books").await;
    response.assert_status_ok();
    let page: Value = response.json();
    assert_eq!(page["total"], 1);
    assert_eq!(page["page"], 1);

    server
        .delete(&format!("/api/v1/books/{}", id))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/v1/books/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_book_input() {
    let server = create_test_server();

    let response = server
        .post("/api/v1/books")
        .json(&json!({ "title": "  ", "author": "Nobody" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());

    server
        .get("/api/v1/books")
        .add_query_param("page_size", 500)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_can_clear_nullable_fields() {
    let server = create_test_server();
    let id = create_book(&server, "Roadside Picnic", Some("Sci-Fi")).await;

    let response = server
        .put(&format!("/api/v1/books/{}", id))
        .json(&json!({ "genre": null }))
        .await;
    response.assert_status_ok();
    let book: Value = response.json();
    assert!(book["genre"].is_null());
    assert_eq!(book["title"], "Roadside Picnic");

    let response = server
        .put(&format!("/api/v1/books/{}", id))
        .json(&json!({ "description": "Zone stalkers" }))
        .await;
    response.assert_status_ok();
    let book: Value = response.json();
    assert!(book["genre"].is_null());
    assert_eq!(book["description"], "Zone stalkers");
}

#[tokio::test]
async fn test_huge_page_number_is_rejected() {
    let server = create_test_server();
    create_book(&server, "Ubik", Some("Sci-Fi")).await;

    let response = server
        .get("/api/v1/books")
        .add_query_param("page", i64::MAX)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn test_review_of_unknown_book_is_forbidden() {
    let server = create_test_server();
    server
        .post("/api/v1/books/4242/reviews")
        .json(&json!({ "user_id": 1, "rating": 4, "body": "Never saw this book" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_borrow_and_return() {
    let server = create_test_server();
    let id = create_book(&server, "Kindred", Some("Fiction")).await;

    let response = server
        .post(&format!("/api/v1/books/{}/borrow", id))
        .json(&json!({ "user_id": 1 }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["status"], "active");

    server
        .post(&format!("/api/v1/books/{}/borrow", id))
        .json(&json!({ "user_id": 2 }))
        .await
        .assert_status(StatusCode::CONFLICT);

    server
        .post("/api/v1/books/999/borrow")
        .json(&json!({ "user_id": 1 }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let borrows: Vec<Value> = server.get("/api/v1/users/1/borrows").await.json();
    assert_eq!(borrows.len(), 1);

    let response = server
        .post(&format!("/api/v1/books/{}/return", id))
        .json(&json!({ "user_id": 1 }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "returned");

    let borrows: Vec<Value> = server.get("/api/v1/users/1/borrows").await.json();
    assert!(borrows.is_empty());
}

#[tokio::test]
async fn test_review_rules() {
    let server = create_test_server();
    let id = create_book(&server, "Parable of the Sower", Some("Fiction")).await;
    let review = json!({ "user_id": 4, "rating": 5, "body": "Unsettling and brilliant" });

    server
        .post(&format!("/api/v1/books/{}/reviews", id))
        .json(&review)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    server
        .post(&format!("/api/v1/books/{}/borrow", id))
        .json(&json!({ "user_id": 4 }))
        .await
        .assert_status(StatusCode::CREATED);

    server
        .post(&format!("/api/v1/books/{}/reviews", id))
        .json(&json!({ "user_id": 4, "rating": 5, "body": "short" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post(&format!("/api/v1/books/{}/reviews", id))
        .json(&review)
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["rating"], 5);

    let response = server.get(&format!("/api/v1/books/{}/analysis", id)).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["book_id"], id);
}

#[tokio::test]
async fn test_preferences_round_trip() {
    let server = create_test_server();

    let response = server.get("/api/v1/users/5/preferences").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["favourite_genres"], json!([]));

    let response = server
        .put("/api/v1/users/5/preferences")
        .json(&json!({
            "favourite_genres": ["Mystery", " Mystery ", ""],
            "disliked_genres": ["Horror"]
        }))
        .await;
    response.assert_status_ok();
    let prefs: Value = response.json();
    assert_eq!(prefs["favourite_genres"], json!(["Mystery"]));
    assert_eq!(prefs["disliked_genres"], json!(["Horror"]));
}

#[tokio::test]
async fn test_recommendations_cold_start() {
    let server = create_test_server();
    create_book(&server, "Neuromancer", Some("Sci-Fi")).await;
    create_book(&server, "Gone Girl", Some("Mystery")).await;

    let response = server.get("/api/v1/users/1/recommendations").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["strategy"], "cold_start_top_rated");
    assert_eq!(body["books"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_recommendations_content_based() {
    let server = create_test_server();
    let first = create_book(&server, "Foundation", Some("Sci-Fi")).await;
    let second = create_book(&server, "Hyperion", Some("Sci-Fi")).await;
    let mystery = create_book(&server, "The Big Sleep", Some("Mystery")).await;
    let scifi = create_book(&server, "Solaris", Some("Sci-Fi")).await;

    for id in [first, second] {
        for action in ["borrow", "return"] {
            server
                .post(&format!("/api/v1/books/{}/{}", id, action))
                .json(&json!({ "user_id": 7 }))
                .await;
        }
    }

    let response = server
        .get("/api/v1/users/7/recommendations")
        .add_query_param("limit", 1)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["strategy"], "content_based");
    let ids: Vec<i64> = body["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![scifi]);

    let body: Value = server.get("/api/v1/users/7/recommendations").await.json();
    let ids: Vec<i64> = body["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![scifi, mystery]);

    let prefs: Value = server.get("/api/v1/users/7/preferences").await.json();
    assert_eq!(prefs["genre_weights"]["Sci-Fi"], 1.0);
}
