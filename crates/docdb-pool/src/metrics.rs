//! Pool counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters describing pool activity.
///
/// Counters are updated with relaxed atomics; a [`snapshot`](Self::snapshot)
/// is consistent per field, not across fields.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    acquired: AtomicU64,
    acquire_timeouts: AtomicU64,
    no_server_rejections: AtomicU64,
    sessions_created: AtomicU64,
    sessions_closed: AtomicU64,
    surplus_closed: AtomicU64,
    reconnects_started: AtomicU64,
    reconnects_completed: AtomicU64,
    refresh_failures: AtomicU64,
}

/// Point-in-time copy of [`PoolMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Sessions handed out by `acquire`.
    pub acquired: u64,
    /// `acquire` calls that timed out.
    pub acquire_timeouts: u64,
    /// `acquire` calls rejected because no master connection was published.
    pub no_server_rejections: u64,
    /// Session handles derived from a master connection.
    pub sessions_created: u64,
    /// Pool-created session handles closed by the pool.
    pub sessions_closed: u64,
    /// Handed-back handles closed because the queue was already full.
    ///
    /// These were not derived by this pool, so they stay out of
    /// [`live_sessions`](Self::live_sessions).
    pub surplus_closed: u64,
    /// Reconnect passes scheduled.
    pub reconnects_started: u64,
    /// Reconnect passes that restored the pool.
    pub reconnects_completed: u64,
    /// Failed master connection refresh attempts.
    pub refresh_failures: u64,
}

impl MetricsSnapshot {
    /// Sessions currently alive (queued or leased).
    #[must_use]
    pub fn live_sessions(&self) -> u64 {
        self.sessions_created.saturating_sub(self.sessions_closed)
    }
}

impl PoolMetrics {
    pub(crate) fn record_acquired(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquire_timeout(&self) {
        self.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_no_server(&self) {
        self.no_server_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_surplus_closed(&self) {
        self.surplus_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_started(&self) {
        self.reconnects_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_completed(&self) {
        self.reconnects_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of reconnect passes scheduled so far.
    #[must_use]
    pub fn reconnects_started(&self) -> u64 {
        self.reconnects_started.load(Ordering::Relaxed)
    }

    /// Number of reconnect passes that restored the pool.
    #[must_use]
    pub fn reconnects_completed(&self) -> u64 {
        self.reconnects_completed.load(Ordering::Relaxed)
    }

    /// Copy every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            acquired: self.acquired.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            no_server_rejections: self.no_server_rejections.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            surplus_closed: self.surplus_closed.load(Ordering::Relaxed),
            reconnects_started: self.reconnects_started.load(Ordering::Relaxed),
            reconnects_completed: self.reconnects_completed.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
        }
    }
}
