use axum::extract::FromRef;
use std::sync::Arc;

use crate::{
    config::Config,
    db::{BookStore, BorrowStore, Cache, PreferenceStore, ReviewStore},
    services::{
        llm::LlmClient, storage::FileStore, LibraryService, RecommendationEngine, TaskContext,
        TaskQueue, TaskWorkerHandle,
    },
};

/// Shared application state
///
/// Handlers extract the service they need through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub library: LibraryService,
    pub recommender: RecommendationEngine,
}

/// Concrete backends the services are wired to
#[derive(Clone)]
pub struct Backends {
    pub books: Arc<dyn BookStore>,
    pub borrows: Arc<dyn BorrowStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub files: Arc<dyn FileStore>,
    pub llm: Arc<dyn LlmClient>,
    pub cache: Option<Cache>,
}

impl AppState {
    pub fn new(library: LibraryService, recommender: RecommendationEngine) -> Self {
        Self {
            library,
            recommender,
        }
    }

    /// Builds the services and starts the background task worker
    pub fn assemble(backends: Backends, config: &Config) -> (Self, TaskWorkerHandle) {
        let (tasks, worker) = TaskQueue::start(TaskContext {
            books: backends.books.clone(),
            reviews: backends.reviews.clone(),
            files: backends.files.clone(),
            llm: backends.llm,
            cache: backends.cache.clone(),
            max_content_length: config.max_content_length,
        });

        let recommender = RecommendationEngine::new(
            backends.books.clone(),
            backends.borrows.clone(),
            backends.preferences.clone(),
            config.recommendation_limit,
        );

        let library = LibraryService::new(
            backends.books,
            backends.borrows,
            backends.reviews,
            backends.preferences,
            backends.files,
            tasks,
            backends.cache,
            config.analysis_cache_ttl,
        );

        (Self::new(library, recommender), worker)
    }
}

impl FromRef<AppState> for LibraryService {
    fn from_ref(state: &AppState) -> Self {
        state.library.clone()
    }
}

impl FromRef<AppState> for RecommendationEngine {
    fn from_ref(state: &AppState) -> Self {
        state.recommender.clone()
    }
}
