pub mod genre_weights;
pub mod library;
pub mod llm;
pub mod recommendations;
pub mod scoring;
pub mod storage;
pub mod tasks;

pub use library::LibraryService;
pub use recommendations::RecommendationEngine;
pub use tasks::{TaskContext, TaskQueue, TaskWorkerHandle};
