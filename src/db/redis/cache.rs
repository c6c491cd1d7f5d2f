use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    BookAnalysis(i64),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::BookAnalysis(book_id) => write!(f, "analysis:{}", book_id),
        }
    }
}

/// Creates a Redis client for caching
///
/// The client connects lazily; no connection is made until first use.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Mutation applied by the writer task, in submission order
#[derive(Debug)]
enum CacheOp {
    Put { key: String, json: String, ttl: u64 },
    Evict { key: String },
}

/// Read-through cache for book analysis responses
///
/// Reads go straight to Redis. Puts and evictions share one ordered queue,
/// so an eviction always lands after any put queued before it.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    ops: mpsc::UnboundedSender<CacheOp>,
}

/// Stops the writer once queued operations are applied
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Cache writer panicked");
        }
    }
}

impl Cache {
    /// Opens a reconnecting connection and starts the writer task
    pub async fn connect(client: Client) -> AppResult<(Self, CacheWriterHandle)> {
        let conn = ConnectionManager::new(client).await?;
        let (ops, ops_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let join = tokio::spawn(Self::writer(conn.clone(), ops_rx, shutdown_rx));

        Ok((Self { conn, ops }, CacheWriterHandle { shutdown_tx, join }))
    }

    async fn writer(
        mut conn: ConnectionManager,
        mut ops: mpsc::UnboundedReceiver<CacheOp>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                Some(op) = ops.recv() => Self::apply(&mut conn, op).await,
                Some(()) = shutdown_rx.recv() => {
                    ops.close();
                    while let Some(op) = ops.recv().await {
                        Self::apply(&mut conn, op).await;
                    }
                    tracing::info!("Cache writer stopped");
                    break;
                }
                else => break,
            }
        }
    }

    async fn apply(conn: &mut ConnectionManager, op: CacheOp) {
        let result: redis::RedisResult<()> = match &op {
            CacheOp::Put { key, json, ttl } => conn.set_ex(key, json, *ttl).await,
            CacheOp::Evict { key } => conn.del(key).await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, ?op, "Cache operation failed");
        }
    }

    /// Cached value for `key`, `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let raw: Option<String> = self.conn.clone().get(key.to_string()).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AppError::Internal(format!("Corrupt cache entry {}: {}", key, e)))
        })
        .transpose()
    }

    /// Queues a put with a TTL in seconds
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        match serde_json::to_string(value) {
            Ok(json) => self.submit(CacheOp::Put {
                key: key.to_string(),
                json,
                ttl,
            }),
            Err(e) => tracing::error!(error = %e, key = %key, "Cache serialization error"),
        }
    }

    /// Queues removal of `key` so the next read recomputes it
    pub fn invalidate(&self, key: &CacheKey) {
        self.submit(CacheOp::Evict {
            key: key.to_string(),
        });
    }

    fn submit(&self, op: CacheOp) {
        if let Err(e) = self.ops.send(op) {
            tracing::error!(error = %e, "Cache writer is gone");
        }
    }
}
