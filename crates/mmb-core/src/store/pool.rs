use std::{
    collections::VecDeque,
    ops::Deref,
    path::{Path, PathBuf},
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use rusqlite::Connection;

use crate::{errors::Error, Result};

/// Fixed-capacity pool of SQLite connections.
///
/// Connections are probed with a trivial query on every acquire; one that
/// fails the probe is discarded and its slot refilled with a freshly opened
/// connection, so capacity is never lost while the database file stays
/// reachable. `acquire` has no timeout; callers needing bounded latency must
/// impose their own.
///
/// The pool is a blocking structure. Callers on the async runtime go through
/// [`crate::store::Database`], which offloads every unit of work to
/// `spawn_blocking`.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    db_path: PathBuf,
    idle: Mutex<VecDeque<Connection>>,
    available: Condvar,
}

const REOPEN_BACKOFF: Duration = Duration::from_millis(100);

impl Pool {
    /// Eagerly opens `capacity` connections.
    pub fn open(db_path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("pool capacity must be at least 1".to_string()));
        }

        let db_path = db_path.as_ref().to_path_buf();
        let mut idle = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            idle.push_back(Connection::open(&db_path)?);
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path,
                idle: Mutex::new(idle),
                available: Condvar::new(),
            }),
        })
    }

    /// Blocks until a live connection is available and hands it out inside an
    /// open transaction. Dead connections are replaced silently.
    pub fn acquire(&self) -> Result<PooledConn> {
        loop {
            let conn = self.inner.wait_for_idle()?;

            if !probe(&conn) {
                drop(conn);
                self.inner.refill_slot();
                continue;
            }

            // Some failures only show up when the transaction opens; treat
            // them like a failed probe.
            if let Err(e) = conn.execute_batch("BEGIN") {
                tracing::warn!(error = %e, "pooled connection failed to open transaction");
                drop(conn);
                self.inner.refill_slot();
                continue;
            }

            return Ok(PooledConn {
                pool: Arc::clone(&self.inner),
                conn: Some(conn),
                committed: false,
            });
        }
    }
}

impl PoolInner {
    fn wait_for_idle(&self) -> Result<Connection> {
        let mut idle = self.idle.lock().map_err(|_| poisoned())?;
        loop {
            if let Some(conn) = idle.pop_front() {
                return Ok(conn);
            }
            idle = self.available.wait(idle).map_err(|_| poisoned())?;
        }
    }

    /// Replace a discarded connection so the pool keeps its capacity. Retries
    /// until the database file is reachable again.
    fn refill_slot(&self) {
        loop {
            match Connection::open(&self.db_path) {
                Ok(conn) => {
                    self.release(conn);
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to reopen pooled connection, retrying");
                    std::thread::sleep(REOPEN_BACKOFF);
                }
            }
        }
    }

    fn release(&self, conn: Connection) {
        match self.idle.lock() {
            Ok(mut idle) => idle.push_back(conn),
            // Dropping the connection here shrinks capacity for good.
            Err(e) => tracing::warn!(error = %e, "idle queue poisoned, dropping connection"),
        }
        self.available.notify_one();
    }
}

fn probe(conn: &Connection) -> bool {
    conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
}

fn poisoned() -> Error {
    Error::External("connection pool mutex poisoned".to_string())
}

/// Scoped acquisition handle: one transaction per unit of work.
///
/// `commit` finalizes; dropping without `commit` rolls back. Either way the
/// borrowed connection, the same one that was validated at hand-out, goes
/// back to the pool on drop.
pub struct PooledConn {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    committed: bool,
}

impl PooledConn {
    pub fn commit(mut self) -> Result<()> {
        if let Some(conn) = self.conn.as_ref() {
            conn.execute_batch("COMMIT")?;
        }
        self.committed = true;
        Ok(())
    }
}

impl Deref for PooledConn {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !self.committed {
            let _ = conn.execute_batch("ROLLBACK");
        }
        self.pool.release(conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        (dir, path)
    }

    fn setup_table(pool: &Pool) {
        let conn = pool.acquire().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        conn.commit().unwrap();
    }

    fn count(pool: &Pool) -> i64 {
        let conn = pool.acquire().unwrap();
        let n = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        conn.commit().unwrap();
        n
    }

    #[test]
    fn zero_capacity_is_a_config_error() {
        let (_dir, path) = scratch_db();
        assert!(matches!(Pool::open(&path, 0), Err(Error::Config(_))));
    }

    #[test]
    fn capacity_one_pool_recycles_the_same_slot() {
        let (_dir, path) = scratch_db();
        let pool = Pool::open(&path, 1).unwrap();
        setup_table(&pool);

        // More sequential acquisitions than capacity: each release must make
        // the slot available again.
        for v in 0..5 {
            let conn = pool.acquire().unwrap();
            conn.execute("INSERT INTO t (v) VALUES (?1)", [v]).unwrap();
            conn.commit().unwrap();
        }
        assert_eq!(count(&pool), 5);
    }

    #[test]
    fn drop_without_commit_rolls_back() {
        let (_dir, path) = scratch_db();
        let pool = Pool::open(&path, 1).unwrap();
        setup_table(&pool);

        {
            let conn = pool.acquire().unwrap();
            conn.execute("INSERT INTO t (v) VALUES (1)", []).unwrap();
            // No commit: the guard must roll back on drop.
        }

        assert_eq!(count(&pool), 0);
    }

    #[test]
    fn commit_persists() {
        let (_dir, path) = scratch_db();
        let pool = Pool::open(&path, 2).unwrap();
        setup_table(&pool);

        let conn = pool.acquire().unwrap();
        conn.execute("INSERT INTO t (v) VALUES (7)", []).unwrap();
        conn.commit().unwrap();

        assert_eq!(count(&pool), 1);
    }

    #[test]
    fn acquire_blocks_until_a_connection_is_released() {
        let (_dir, path) = scratch_db();
        let pool = Pool::open(&path, 1).unwrap();
        setup_table(&pool);

        let held = pool.acquire().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let waiter = {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let conn = pool.acquire().unwrap();
                tx.send(()).unwrap();
                conn.commit().unwrap();
            })
        };

        // The waiter must still be parked while we hold the only connection.
        assert!(rx
            .recv_timeout(std::time::Duration::from_millis(100))
            .is_err());

        drop(held);
        rx.recv_timeout(std::time::Duration::from_secs(5))
            .expect("waiter should acquire after release");
        waiter.join().unwrap();
    }

    #[test]
    fn dead_slot_is_discarded_and_refilled_on_acquire() {
        let (_dir, path) = scratch_db();
        let pool = Pool::open(&path, 1).unwrap();
        setup_table(&pool);

        // Swap the only idle connection for one that cannot open a
        // transaction: it answers the probe but fails at BEGIN, which must
        // drive the discard-and-refill path.
        {
            let mut idle = pool.inner.idle.lock().unwrap();
            idle.clear();
            let stuck = Connection::open(&path).unwrap();
            stuck.execute_batch("BEGIN").unwrap();
            idle.push_back(stuck);
        }

        let conn = pool.acquire().unwrap();
        conn.execute("INSERT INTO t (v) VALUES (1)", []).unwrap();
        conn.commit().unwrap();

        // Capacity survived the replacement.
        assert_eq!(count(&pool), 1);
    }

    #[test]
    fn probe_accepts_healthy_connection() {
        let (_dir, path) = scratch_db();
        let conn = Connection::open(&path).unwrap();
        assert!(probe(&conn));
    }
}
