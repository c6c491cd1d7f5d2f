/// Out-of-band LLM work
///
/// Request handlers enqueue tasks and return immediately. A single worker
/// drains the queue, so LLM latency or failure never blocks a request.
/// Failures are logged; the summary task also records them in the book's
/// `summary_status`.
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    db::{BookStore, Cache, CacheKey, ReviewStore},
    error::AppResult,
    models::{average_rating, SummaryStatus},
    services::{
        llm::{self, LlmClient},
        storage::FileStore,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundTask {
    GenerateSummary { book_id: i64 },
    UpdateReviewConsensus { book_id: i64 },
}

/// Everything the worker needs to run tasks
#[derive(Clone)]
pub struct TaskContext {
    pub books: Arc<dyn BookStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub files: Arc<dyn FileStore>,
    pub llm: Arc<dyn LlmClient>,
    pub cache: Option<Cache>,
    pub max_content_length: usize,
}

/// Sender side of the task queue
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<BackgroundTask>,
}

/// Handle for stopping the worker after it drains queued tasks
///
/// Dropping the handle leaves the worker running until every `TaskQueue`
/// clone is gone.
pub struct TaskWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl TaskWorkerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Task worker panicked");
        }
    }
}

impl TaskQueue {
    /// Spawns the worker and returns the queue feeding it
    pub fn start(ctx: TaskContext) -> (Self, TaskWorkerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let join = tokio::spawn(async move {
            Self::worker(ctx, rx, shutdown_rx).await;
        });

        (Self { tx }, TaskWorkerHandle { shutdown_tx, join })
    }

    /// Fire-and-forget enqueue
    pub fn enqueue(&self, task: BackgroundTask) {
        if let Err(e) = self.tx.send(task) {
            tracing::error!(error = %e, "Failed to enqueue background task");
        } else {
            tracing::debug!(?task, "Background task queued");
        }
    }

    async fn worker(
        ctx: TaskContext,
        mut rx: mpsc::UnboundedReceiver<BackgroundTask>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Task worker started");

        loop {
            tokio::select! {
                Some(task) = rx.recv() => ctx.run(task).await,
                Some(()) = shutdown_rx.recv() => {
                    rx.close();
                    while let Some(task) = rx.recv().await {
                        ctx.run(task).await;
                    }
                    tracing::info!("Task worker stopped");
                    break;
                }
                else => break,
            }
        }
    }
}

impl TaskContext {
    /// Runs one task, logging instead of propagating failures
    pub async fn run(&self, task: BackgroundTask) {
        let result = match task {
            BackgroundTask::GenerateSummary { book_id } => self.generate_summary(book_id).await,
            BackgroundTask::UpdateReviewConsensus { book_id } => {
                self.update_review_consensus(book_id).await
            }
        };

        if let Err(e) = result {
            tracing::error!(error = %e, ?task, "Background task failed");
        }
    }

    /// Summarizes a book's stored content with the LLM
    ///
    /// Books without content are skipped. The status moves to `processing`,
    /// then to `completed` or `failed`.
    pub async fn generate_summary(&self, book_id: i64) -> AppResult<()> {
        let Some(book) = self.books.get(book_id).await? else {
            return Ok(());
        };
        let Some(file_key) = book.file_key.clone() else {
            return Ok(());
        };

        self.books
            .set_summary(book_id, SummaryStatus::Processing, None)
            .await?;

        let outcome = async {
            let raw = self.files.read(&file_key).await?;
            let content: String = String::from_utf8_lossy(&raw)
                .chars()
                .take(self.max_content_length)
                .collect();

            self.llm
                .complete(
                    llm::BOOK_SUMMARY_SYSTEM,
                    &llm::build_summary_prompt(&book.title, &book.author, &content),
                    llm::SUMMARY_MAX_TOKENS,
                )
                .await
        }
        .await;

        let result = match outcome {
            Ok(summary) => {
                self.books
                    .set_summary(book_id, SummaryStatus::Completed, Some(summary))
                    .await?;
                tracing::info!(book_id, "Book summary generated");
                Ok(())
            }
            Err(e) => {
                self.books
                    .set_summary(book_id, SummaryStatus::Failed, None)
                    .await?;
                Err(e)
            }
        };

        self.invalidate_analysis(book_id);
        result
    }

    /// Recomputes rating stats and the LLM review consensus for a book
    ///
    /// Stats are stored before the LLM call so they stay current even when
    /// the consensus cannot be generated.
    pub async fn update_review_consensus(&self, book_id: i64) -> AppResult<()> {
        let Some(book) = self.books.get(book_id).await? else {
            return Ok(());
        };
        let reviews = self.reviews.list_by_book(book_id).await?;
        if reviews.is_empty() {
            return Ok(());
        }

        self.books
            .set_review_stats(book_id, average_rating(&reviews), reviews.len() as i32)
            .await?;
        self.invalidate_analysis(book_id);

        let consensus = self
            .llm
            .complete(
                llm::REVIEW_CONSENSUS_SYSTEM,
                &llm::build_review_consensus_prompt(&book.title, &reviews),
                llm::CONSENSUS_MAX_TOKENS,
            )
            .await?;

        self.books.set_review_consensus(book_id, consensus).await?;
        self.invalidate_analysis(book_id);

        tracing::info!(book_id, reviews = reviews.len(), "Review consensus updated");
        Ok(())
    }

    fn invalidate_analysis(&self, book_id: i64) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&CacheKey::BookAnalysis(book_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::AppError;
    use crate::models::{NewBook, NewReview};
    use crate::services::llm::MockLlmClient;
    use crate::services::storage::LocalFileStore;
    use uuid::Uuid;

    fn context(store: &MemoryStore, client: MockLlmClient) -> TaskContext {
        let store = Arc::new(store.clone());
        TaskContext {
            books: store.clone(),
            reviews: store,
            files: Arc::new(LocalFileStore::new(
                std::env::temp_dir().join(format!("lumina-tasks-{}", Uuid::new_v4())),
            )),
            llm: Arc::new(client),
            cache: None,
            max_content_length: 2000,
        }
    }

    async fn book_with_content(store: &MemoryStore, ctx: &TaskContext) -> i64 {
        let key = ctx.files.put(b"Spice and sandworms.", "dune.txt").await.unwrap();
        BookStore::create(
            store,
            NewBook {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                file_key: Some(key),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_summary_completed() {
        let store = MemoryStore::new();
        let mut client = MockLlmClient::new();
        client.expect_complete()
            .withf(|system, user, max_tokens| {
                system.starts_with("You are a professional librarian")
                    && user.contains("Spice and sandworms.")
                    && *max_tokens == llm::SUMMARY_MAX_TOKENS
            })
            .times(1)
            .returning(|_, _, _| Ok("A desert epic.".to_string()));
        let ctx = context(&store, client);
        let id = book_with_content(&store, &ctx).await;

        ctx.generate_summary(id).await.unwrap();

        let book = store.get(id).await.unwrap().unwrap();
        assert_eq!(book.summary_status, SummaryStatus::Completed);
        assert_eq!(book.ai_summary.as_deref(), Some("A desert epic."));
    }

    #[tokio::test]
    async fn test_summary_failure_flips_status() {
        let store = MemoryStore::new();
        let mut client = MockLlmClient::new();
        client.expect_complete()
            .returning(|_, _, _| Err(AppError::Llm("model offline".to_string())));
        let ctx = context(&store, client);
        let id = book_with_content(&store, &ctx).await;

        assert!(ctx.generate_summary(id).await.is_err());

        let book = store.get(id).await.unwrap().unwrap();
        assert_eq!(book.summary_status, SummaryStatus::Failed);
        assert!(book.ai_summary.is_none());
    }

    #[tokio::test]
    async fn test_summary_skips_book_without_content() {
        let store = MemoryStore::new();
        let mut client = MockLlmClient::new();
        client.expect_complete().never();
        let ctx = context(&store, client);
        let book = BookStore::create(
            &store,
            NewBook {
                title: "No file".to_string(),
                author: "Anon".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        ctx.generate_summary(book.id).await.unwrap();
        ctx.generate_summary(404).await.unwrap();

        let book = store.get(book.id).await.unwrap().unwrap();
        assert_eq!(book.summary_status, SummaryStatus::Pending);
    }

    #[tokio::test]
    async fn test_review_consensus_updates_stats_and_text() {
        let store = MemoryStore::new();
        let mut client = MockLlmClient::new();
        client.expect_complete()
            .times(1)
            .returning(|_, _, _| Ok("Readers are split.".to_string()));
        let ctx = context(&store, client);
        let id = book_with_content(&store, &ctx).await;
        for (user_id, rating) in [(1, 5), (2, 2)] {
            ReviewStore::create(
                &store,
                NewReview {
                    user_id,
                    book_id: id,
                    rating,
                    body: "Thoughtful and long review".to_string(),
                },
            )
            .await
            .unwrap();
        }

        ctx.update_review_consensus(id).await.unwrap();

        let book = store.get(id).await.unwrap().unwrap();
        assert_eq!(book.review_count, 2);
        assert_eq!(book.average_rating, 3.5);
        assert_eq!(book.ai_review_consensus.as_deref(), Some("Readers are split."));
    }

    #[tokio::test]
    async fn test_review_stats_survive_llm_failure() {
        let store = MemoryStore::new();
        let mut client = MockLlmClient::new();
        client.expect_complete()
            .returning(|_, _, _| Err(AppError::Llm("timeout".to_string())));
        let ctx = context(&store, client);
        let id = book_with_content(&store, &ctx).await;
        ReviewStore::create(
            &store,
            NewReview {
                user_id: 1,
                book_id: id,
                rating: 4,
                body: "Solid world building".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(ctx.update_review_consensus(id).await.is_err());

        let book = store.get(id).await.unwrap().unwrap();
        assert_eq!(book.review_count, 1);
        assert_eq!(book.average_rating, 4.0);
        assert!(book.ai_review_consensus.is_none());
    }

    #[tokio::test]
    async fn test_queue_drains_on_shutdown() {
        let store = MemoryStore::new();
        let mut client = MockLlmClient::new();
        client.expect_complete()
            .returning(|_, _, _| Ok("Queued summary.".to_string()));
        let ctx = context(&store, client);
        let id = book_with_content(&store, &ctx).await;

        let (queue, handle) = TaskQueue::start(ctx);
        queue.enqueue(BackgroundTask::GenerateSummary { book_id: id });
        handle.shutdown().await;

        let book = store.get(id).await.unwrap().unwrap();
        assert_eq!(book.summary_status, SummaryStatus::Completed);
    }
}
