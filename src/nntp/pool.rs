//! Bounded per-provider connection pool (spec §4.3).
//!
//! Capacity is enforced with a [`Semaphore`] sized to `max_connections`:
//! a permit is held only for the span a connection is actually checked out.
//! Going idle releases the permit immediately, so an idle connection costs
//! nothing but a slot in `idle`; a checkout first waits for a permit, then
//! reuses an idle connection if one is ready or opens a new one. Waiters
//! queue on the semaphore in FIFO order and time out after 30s.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::warn;

use crate::nntp::config::NntpServerConfig;
use crate::nntp::connection::NntpConnection;
use crate::nntp::error::NntpError;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_REAP_AGE: Duration = Duration::from_secs(60);

struct IdleConnection {
    conn: NntpConnection,
    idle_since: Instant,
}

pub struct NntpPool {
    config: NntpServerConfig,
    idle: Mutex<VecDeque<IdleConnection>>,
    semaphore: Arc<Semaphore>,
    closed: AtomicBool,
}

/// A checked-out connection. Returning it to the pool (instead of letting
/// it leak as a bare connection) happens on drop.
pub struct PoolGuard {
    conn: Option<NntpConnection>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<NntpPool>,
}

impl PoolGuard {
    pub fn connection(&mut self) -> &mut NntpConnection {
        self.conn.as_mut().expect("connection taken before guard dropped")
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let (Some(conn), Some(permit)) = (self.conn.take(), self.permit.take()) else {
            return;
        };
        // The permit is released here unconditionally — an idle connection
        // holds no permit, so it never competes with acquire() for capacity.
        if conn.is_ready() && !self.pool.closed.load(Ordering::SeqCst) {
            let mut idle = self.pool.idle.lock().expect("nntp pool idle lock poisoned");
            idle.push_back(IdleConnection {
                conn,
                idle_since: Instant::now(),
            });
        }
        drop(permit);
    }
}

impl NntpPool {
    pub fn new(config: NntpServerConfig) -> Arc<Self> {
        let max = config.max_connections.max(1);
        Arc::new(Self {
            config,
            idle: Mutex::new(VecDeque::new()),
            semaphore: Arc::new(Semaphore::new(max)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn provider_name(&self) -> &str {
        &self.config.name
    }

    /// Checks out a ready connection, waiting up to 30s for capacity.
    pub async fn acquire(self: &Arc<Self>) -> Result<PoolGuard, NntpError> {
        let permit = match timeout(ACQUIRE_TIMEOUT, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(NntpError::PoolClosed),
            Err(_) => return Err(NntpError::PoolTimeout),
        };

        let reused = {
            let mut idle = self.idle.lock().expect("nntp pool idle lock poisoned");
            idle.pop_front()
        };

        let conn = match reused {
            Some(idle_conn) if idle_conn.conn.is_ready() => idle_conn.conn,
            _ => NntpConnection::connect(&self.config).await?,
        };

        Ok(PoolGuard {
            conn: Some(conn),
            permit: Some(permit),
            pool: Arc::clone(self),
        })
    }

    /// Closes and drops idle connections that have sat unused past
    /// [`IDLE_REAP_AGE`], freeing their capacity. Called periodically by
    /// [`crate::nntp::manager::NntpClientManager`].
    pub async fn reap_idle(&self) {
        let expired = {
            let mut idle = self.idle.lock().expect("nntp pool idle lock poisoned");
            let now = Instant::now();
            let mut expired = Vec::new();
            let mut remaining = VecDeque::with_capacity(idle.len());
            while let Some(entry) = idle.pop_front() {
                if now.duration_since(entry.idle_since) >= IDLE_REAP_AGE {
                    expired.push(entry);
                } else {
                    remaining.push_back(entry);
                }
            }
            *idle = remaining;
            expired
        };

        for mut entry in expired {
            if let Err(err) = entry.conn.quit().await {
                warn!(provider = %self.config.name, error = %err, "error closing idle nntp connection");
            }
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("nntp pool idle lock poisoned").len()
    }

    pub fn max_connections(&self) -> usize {
        self.config.max_connections
    }

    /// Rejects every waiter (current and future) with [`NntpError::PoolClosed`]
    /// and disconnects every connection: idle ones immediately, checked-out
    /// ones as they're returned (they're dropped instead of going idle, see
    /// [`PoolGuard`]'s `Drop` impl).
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.semaphore.close();

        let idle = {
            let mut idle = self.idle.lock().expect("nntp pool idle lock poisoned");
            std::mem::take(&mut *idle)
        };
        for mut entry in idle {
            if let Err(err) = entry.conn.quit().await {
                warn!(provider = %self.config.name, error = %err, "error closing nntp connection during pool shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_with_empty_idle_queue() {
        let config = NntpServerConfig::new(
            "test".into(),
            "news.example.com".into(),
            563,
            true,
            None,
            None,
            5,
            0,
        );
        let pool = NntpPool::new(config);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.max_connections(), 5);
    }
}
