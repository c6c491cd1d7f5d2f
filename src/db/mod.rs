pub mod memory;
pub mod postgres;
pub mod redis;
pub mod stores;

pub use memory::MemoryStore;
pub use postgres::{create_pool, run_migrations, PgStore};
pub use redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle};
pub use stores::{BookStore, BorrowStore, PreferenceStore, ReviewStore};
