//! Session pool implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::{ConnectionFault, PoolError};
use crate::lifecycle::{Connector, MasterConnection, PoolState, Session};
use crate::metrics::PoolMetrics;
use crate::queue::{PopError, SessionQueue};
use crate::reconnect;

/// Session handle type produced by a connector's master connection.
pub type SessionOf<C> = <<C as Connector>::Master as MasterConnection>::Session;

/// A bounded pool of database sessions.
///
/// The pool dials one master connection in [`run`](Self::run), derives a
/// fixed number of sessions from it and leases them through
/// [`acquire`](Self::acquire). Callers hand sessions back with
/// [`release`](Self::release) together with the result of their work; a
/// result that reports a lost connection starts a background reconnect pass
/// that drains, closes and regenerates every session.
///
/// `Pool` is a cheap handle: clone it and pass it to every task that needs
/// database access.
///
/// Reconnect passes are spawned on the runtime of the task that releases the
/// failed session, falling back to the runtime [`run`](Self::run) was called
/// on. Releasing a session from outside any runtime after that runtime has
/// shut down drops the pass and leaves the pool `Reconnecting` until
/// [`close`](Self::close).
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

pub(crate) struct PoolInner<C: Connector> {
    pub(crate) hosts: String,
    pub(crate) config: PoolConfig,
    pub(crate) capacity: usize,
    connector: C,
    pub(crate) queue: SessionQueue<SessionOf<C>>,
    pub(crate) shared: Mutex<Shared<C::Master>>,
    pub(crate) metrics: PoolMetrics,
    pub(crate) shutdown: CancellationToken,
}

/// State guarded by the pool mutex.
pub(crate) struct Shared<M> {
    pub(crate) state: PoolState,
    // Present iff `state` is `Ready`.
    pub(crate) master: Option<M>,
    pub(crate) runtime: Option<Handle>,
    pub(crate) reconnect_task: Option<JoinHandle<()>>,
    dialing: bool,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool of `capacity` sessions against `hosts`.
    ///
    /// A capacity of zero falls back to
    /// [`DEFAULT_MAX_SESSIONS`](crate::config::DEFAULT_MAX_SESSIONS). No I/O
    /// happens until [`run`](Self::run).
    pub fn new(connector: C, hosts: impl Into<String>, capacity: usize) -> Self {
        Self::build(
            connector,
            hosts.into(),
            PoolConfig::new().max_sessions(capacity),
        )
    }

    /// Create a pool from a full configuration.
    pub fn with_config(
        connector: C,
        hosts: impl Into<String>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self::build(connector, hosts.into(), config))
    }

    fn build(connector: C, hosts: String, config: PoolConfig) -> Self {
        let capacity = config.capacity();
        tracing::info!(hosts = %hosts, max_sessions = capacity, "session pool created");

        Self {
            inner: Arc::new(PoolInner {
                hosts,
                capacity,
                connector,
                queue: SessionQueue::new(capacity),
                shared: Mutex::new(Shared {
                    state: PoolState::Uninitialized,
                    master: None,
                    runtime: None,
                    reconnect_task: None,
                    dialing: false,
                }),
                metrics: PoolMetrics::default(),
                shutdown: CancellationToken::new(),
                config,
            }),
        }
    }

    /// Dial the master connection and fill the pool.
    ///
    /// Call once before any [`acquire`](Self::acquire). A
    /// [`PoolError::Connect`] is fatal: nothing can ever be served, so the
    /// caller should stop the process rather than keep the pool around.
    pub async fn run(&self) -> Result<(), PoolError> {
        {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                PoolState::Closed => return Err(PoolError::PoolClosed),
                PoolState::Uninitialized if !shared.dialing => shared.dialing = true,
                _ => return Err(PoolError::AlreadyRunning),
            }
        }

        let dialed = self.dial().await;

        let mut shared = self.inner.shared.lock();
        shared.dialing = false;
        let master = dialed?;

        if shared.state == PoolState::Closed {
            drop(shared);
            master.close();
            return Err(PoolError::PoolClosed);
        }

        master.set_pool_limit(self.inner.capacity);
        let filled = self.inner.fill(&master);

        shared.master = Some(master);
        shared.runtime = Handle::try_current().ok();
        shared.state = PoolState::Ready;
        drop(shared);

        tracing::info!(hosts = %self.inner.hosts, sessions = filled, "session pool ready");
        Ok(())
    }

    async fn dial(&self) -> Result<C::Master, PoolError> {
        let inner = &self.inner;
        let timeout = inner.config.connect_timeout;
        tracing::debug!(hosts = %inner.hosts, ?timeout, "dialing master connection");

        let reason = match tokio::time::timeout(timeout, inner.connector.dial(&inner.hosts)).await
        {
            Ok(Ok(master)) => return Ok(master),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {timeout:?}"),
        };

        tracing::error!(hosts = %inner.hosts, %reason, "failed to connect to database");
        Err(PoolError::Connect {
            hosts: inner.hosts.clone(),
            reason,
        })
    }

    /// Lease a session, waiting up to the configured acquire timeout.
    pub async fn acquire(&self) -> Result<SessionOf<C>, PoolError> {
        self.acquire_timeout(self.inner.config.acquire_timeout).await
    }

    /// Lease a session, waiting up to `timeout`.
    ///
    /// Fails immediately with [`PoolError::NoServer`] while no master
    /// connection is published, either because [`run`](Self::run) has not
    /// succeeded or because a reconnect pass is under way. A zero timeout
    /// never waits.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<SessionOf<C>, PoolError> {
        match self.state() {
            PoolState::Ready => {}
            PoolState::Closed => return Err(PoolError::PoolClosed),
            state => {
                self.inner.metrics.record_no_server();
                tracing::debug!(%state, "no master connection, rejecting acquire");
                return Err(PoolError::NoServer);
            }
        }

        tracing::trace!("acquiring session from pool");

        match self.inner.queue.pop(Some(timeout)).await {
            Ok(session) => {
                self.inner.metrics.record_acquired();
                Ok(session)
            }
            Err(PopError::Timeout) => {
                self.inner.metrics.record_acquire_timeout();
                tracing::debug!(?timeout, "session acquisition timed out");
                Err(PoolError::AcquireTimeout(timeout))
            }
            Err(PopError::Closed) => Err(PoolError::PoolClosed),
        }
    }

    /// Hand a leased session back together with the outcome of its use.
    ///
    /// The session always goes back into rotation. When `outcome` is an
    /// error whose [`ConnectionFault::is_connection_lost`] is `true`, a
    /// reconnect pass is scheduled unless one is already running; other
    /// errors are treated as application failures and change nothing.
    ///
    /// Never waits. On a closed pool the session is closed instead.
    pub fn release<T, E>(&self, session: SessionOf<C>, outcome: &Result<T, E>)
    where
        E: ConnectionFault + fmt::Display,
    {
        let lost = match outcome {
            Ok(_) => false,
            Err(e) if e.is_connection_lost() => {
                tracing::warn!(hosts = %self.inner.hosts, error = %e, "session lost its connection");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "session released after application error");
                false
            }
        };

        match self.inner.queue.push(session) {
            Ok(()) => tracing::trace!("session returned to pool"),
            // After shutdown the handle is one of ours that was leased at close.
            Err(session) if self.inner.shutdown.is_cancelled() => self.inner.discard(session),
            Err(session) => {
                tracing::warn!(
                    capacity = self.inner.capacity,
                    "pool already holds every session, closing surplus handle"
                );
                session.close();
                self.inner.metrics.record_surplus_closed();
            }
        }

        if lost {
            reconnect::schedule(&self.inner);
        }
    }

    /// Shut the pool down.
    ///
    /// Cancels a pending reconnect pass and waits for it to stop, then closes
    /// every queued session and the master connection. Sessions still leased
    /// are closed when they are released. Calling this more than once is a
    /// no-op.
    pub async fn close(&self) {
        let (master, task) = {
            let mut shared = self.inner.shared.lock();
            if shared.state == PoolState::Closed {
                return;
            }
            shared.state = PoolState::Closed;
            (shared.master.take(), shared.reconnect_task.take())
        };

        self.inner.shutdown.cancel();
        let queued = self.inner.queue.close();
        let closed = queued.len();
        for session in queued {
            self.inner.discard(session);
        }

        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "reconnect task ended abnormally");
            }
        }
        if let Some(master) = master {
            master.close();
        }

        tracing::info!(hosts = %self.inner.hosts, sessions_closed = closed, "session pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == PoolState::Closed
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.inner.shared.lock().state
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let available = self.inner.queue.len();
        let snapshot = self.inner.metrics.snapshot();
        let live = usize::try_from(snapshot.live_sessions()).unwrap_or(usize::MAX);

        PoolStatus {
            state: self.state(),
            capacity: self.inner.capacity,
            available,
            leased: live.saturating_sub(available),
            reconnects: snapshot.reconnects_completed,
        }
    }

    /// Pool counters.
    #[must_use]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.inner.metrics
    }

    /// Number of sessions the pool maintains.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Target hosts string.
    #[must_use]
    pub fn hosts(&self) -> &str {
        &self.inner.hosts
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<C: Connector> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("hosts", &self.inner.hosts)
            .field("capacity", &self.inner.capacity)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> PoolInner<C> {
    /// Derive `capacity` sessions from `master` into the queue.
    pub(crate) fn fill(&self, master: &C::Master) -> usize {
        let mut filled = 0;
        for _ in 0..self.capacity {
            let session = master.copy();
            self.metrics.record_session_created();
            match self.queue.push(session) {
                Ok(()) => filled += 1,
                Err(session) => self.discard(session),
            }
        }
        filled
    }

    pub(crate) fn discard(&self, session: SessionOf<C>) {
        session.close();
        self.metrics.record_session_closed();
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Lifecycle state.
    pub state: PoolState,
    /// Number of sessions the pool maintains.
    pub capacity: usize,
    /// Sessions queued and ready to lease.
    pub available: usize,
    /// Sessions currently held by callers.
    pub leased: usize,
    /// Completed reconnect passes.
    pub reconnects: u64,
}

impl PoolStatus {
    /// Percentage of capacity currently leased.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.leased as f64 / self.capacity as f64 * 100.0
    }
}
