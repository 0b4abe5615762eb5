//! Idle session pool.
//!
//! Holds sessions handed back by their users, most recently recycled first.
//! Only healthy sessions are kept, and never more than `max_size`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::session::Session;

/// Pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Sessions currently idle
    pub idle: usize,
    pub max_size: usize,
    /// Sessions accepted back into the pool
    pub total_recycled: u64,
    /// Sessions dropped by a sweep or refused on recycle
    pub total_discarded: u64,
}

/// Idle sessions, most recently recycled at the front.
pub struct SessionPool {
    max_size: usize,
    idle: Mutex<VecDeque<Session>>,
    closed: AtomicBool,
    total_recycled: AtomicU64,
    total_discarded: AtomicU64,
}

impl SessionPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            idle: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            total_recycled: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
        }
    }

    /// Takes the most recently recycled session. Its health is not checked.
    pub fn pop(&self) -> Option<Session> {
        self.idle.lock().pop_front()
    }

    /// Offers a session back to the pool.
    ///
    /// Unhealthy idle sessions are swept out first. The session is then kept
    /// only if the pool is open, the session is healthy, the pool has room
    /// and it is not already pooled. A refused session is handed back so the
    /// caller can close its connection.
    pub fn recycle(&self, session: Session) -> Result<(), Session> {
        let mut idle = self.idle.lock();

        let before = idle.len();
        idle.retain(Session::is_healthy);
        let swept = before - idle.len();
        if swept > 0 {
            self.total_discarded.fetch_add(swept as u64, Ordering::Relaxed);
            tracing::debug!(swept, "swept unhealthy sessions from pool");
        }

        let present = idle.iter().any(|s| s.same_as(&session));
        if !self.is_closed() && session.is_healthy() && idle.len() < self.max_size && !present {
            tracing::debug!(connection_id = session.connection_id(), "session recycled");
            idle.push_front(session);
            self.total_recycled.fetch_add(1, Ordering::Relaxed);
            Ok(())
        } else {
            tracing::debug!(
                connection_id = session.connection_id(),
                healthy = session.is_healthy(),
                closed = self.is_closed(),
                "session not recycled"
            );
            if !present {
                self.total_discarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(session)
        }
    }

    /// Refuses every later recycle and hands back the idle sessions.
    pub fn close(&self) -> Vec<Session> {
        self.closed.store(true, Ordering::SeqCst);
        self.drain()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Empties the pool.
    pub fn drain(&self) -> Vec<Session> {
        self.idle.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.lock().is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            idle: self.len(),
            max_size: self.max_size,
            total_recycled: self.total_recycled.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("idle", &self.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::session::tests::session_with;
    use std::sync::Weak;

    #[tokio::test]
    async fn test_most_recent_first() {
        let pool = SessionPool::new(3);
        let (a, _sa) = session_with(Weak::new()).await;
        let (b, _sb) = session_with(Weak::new()).await;
        let (a_id, b_id) = (a.connection_id(), b.connection_id());

        assert!(pool.recycle(a).is_ok());
        assert!(pool.recycle(b).is_ok());
        assert_eq!(pool.pop().unwrap().connection_id(), b_id);
        assert_eq!(pool.pop().unwrap().connection_id(), a_id);
        assert!(pool.pop().is_none());
    }

    #[tokio::test]
    async fn test_capacity_is_respected() {
        let pool = SessionPool::new(1);
        let (a, _sa) = session_with(Weak::new()).await;
        let (b, _sb) = session_with(Weak::new()).await;

        assert!(pool.recycle(a).is_ok());
        assert!(pool.recycle(b).is_err());
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.metrics().total_discarded, 1);
    }

    #[tokio::test]
    async fn test_unhealthy_sessions_are_refused_and_swept() {
        let pool = SessionPool::new(5);
        let (a, _sa) = session_with(Weak::new()).await;
        let (b, _sb) = session_with(Weak::new()).await;
        let (c, _sc) = session_with(Weak::new()).await;

        b.close_connection().await;
        assert!(pool.recycle(b).is_err());
        assert!(pool.is_empty());

        assert!(pool.recycle(a).is_ok());
        let a = pool.pop().unwrap();
        a.close_connection().await;
        assert!(pool.recycle(a).is_err());

        // Health changes while pooled; the next recycle sweeps it out.
        assert!(pool.recycle(c).is_ok());
        let c = pool.pop().unwrap();
        c.close_connection().await;
        pool.idle.lock().push_front(c);
        let (d, _sd) = session_with(Weak::new()).await;
        assert!(pool.recycle(d).is_ok());
        assert_eq!(pool.len(), 1);
        assert!(pool.drain().iter().all(Session::is_healthy));
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_sessions() {
        let pool = SessionPool::new(2);
        let (a, _sa) = session_with(Weak::new()).await;
        let (b, _sb) = session_with(Weak::new()).await;
        let b_id = b.connection_id();

        assert!(pool.recycle(a).is_ok());
        let drained = pool.close();
        assert_eq!(drained.len(), 1);
        assert!(pool.is_closed());

        let refused = pool.recycle(b).unwrap_err();
        assert_eq!(refused.connection_id(), b_id);
        assert!(pool.is_empty());
    }
}
