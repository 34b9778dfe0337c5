//! Persistence layer: the `PersistencePort` trait, its SQLite-backed
//! implementation, the connection pool, and the in-process TTL cache.

pub mod cache;
pub mod pool;
pub mod port;
pub mod sqlite;

pub use cache::TtlCache;
pub use pool::Pool;
pub use port::{NewsRangeFilter, PersistencePort, UpsertOutcome};
pub use sqlite::SqlitePersistence;
