//! Bounded SQLite connection pool; connections are leased per logical
//! operation and returned on all exit paths, including failure.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

pub struct Pool {
    idle: Mutex<VecDeque<Connection>>,
    permits: Semaphore,
}

/// A leased connection. Returned to the pool on drop regardless of how the
/// caller's logical operation exits (success, error, or panic unwind).
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a Pool,
    _permit: SemaphorePermit<'a>,
}

impl<'a> std::ops::Deref for PooledConnection<'a> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl<'a> std::ops::DerefMut for PooledConnection<'a> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<'a> Drop for PooledConnection<'a> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().push_back(conn);
        }
    }
}

impl Pool {
    /// Build a pool of `size` connections, each pointed at `path` (or
    /// in-memory, shared via a URI, when `path == ":memory:"` is not what
    /// callers want for a *pool* — tests should use `Pool::new_in_memory`).
    pub fn new(path: &str, size: usize) -> rusqlite::Result<Arc<Self>> {
        let mut idle = VecDeque::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open(path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            idle.push_back(conn);
        }
        Ok(Arc::new(Self {
            idle: Mutex::new(idle),
            permits: Semaphore::new(size),
        }))
    }

    /// An in-memory pool backed by a single shared cache connection, for
    /// tests: each leased connection hits the same `:memory:` database via
    /// SQLite's shared-cache mode.
    pub fn new_in_memory(size: usize) -> rusqlite::Result<Arc<Self>> {
        let uri = "file::memory:?cache=shared";
        let mut idle = VecDeque::with_capacity(size);
        // Keep one connection open for the lifetime of the pool so the
        // shared in-memory database isn't dropped once all leases return.
        let keepalive = Connection::open(uri)?;
        idle.push_back(keepalive);
        for _ in 1..size {
            idle.push_back(Connection::open(uri)?);
        }
        Ok(Arc::new(Self {
            idle: Mutex::new(idle),
            permits: Semaphore::new(size),
        }))
    }

    pub async fn get(&self) -> PooledConnection<'_> {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("pool semaphore closed");
        let conn = self
            .idle
            .lock()
            .pop_front()
            .expect("permit acquired but no idle connection");
        PooledConnection {
            conn: Some(conn),
            pool: self,
            _permit: permit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leased_connection_returns_to_pool_on_drop() {
        let pool = Pool::new_in_memory(2).unwrap();
        {
            let _c1 = pool.get().await;
            let _c2 = pool.get().await;
        }
        // Both permits should be available again after the leases dropped.
        let _c3 = pool.get().await;
        let _c4 = pool.get().await;
    }
}
