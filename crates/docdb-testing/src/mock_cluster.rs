//! In-memory mock document cluster.
//!
//! This module provides a [`Connector`] implementation that behaves like a
//! small document database without any network I/O, so pool behavior can be
//! tested deterministically.
//!
//! ## Fault model
//!
//! - [`MockCluster::go_offline`] breaks every existing session and makes
//!   dials and refreshes fail until [`MockCluster::go_online`].
//! - [`MockCluster::kill_connections`] breaks every existing session while
//!   the server stays reachable, so the next refresh heals the link.
//! - Sessions derived before the last break keep failing with
//!   [`MockError::ConnectionLost`] even after the cluster is back; only
//!   sessions derived after a successful refresh work again.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docdb_pool::Pool;
//! use docdb_testing::MockCluster;
//!
//! let cluster = MockCluster::builder().refresh_failures(1).build();
//! let pool = Pool::new(cluster.clone(), "mock:27017", 2);
//! pool.run().await?;
//!
//! let session = pool.acquire().await?;
//! cluster.kill_connections();
//! let result = session.upsert("k", "v").await;
//! pool.release(session, &result); // schedules a reconnect
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use docdb_pool::{ConnectionFault, Connector, MasterConnection, Session};
use parking_lot::Mutex;
use thiserror::Error;

/// Error type for mock cluster operations.
#[derive(Debug, Error)]
pub enum MockError {
    /// Dialing the cluster failed.
    #[error("dial failed: {0}")]
    Dial(String),

    /// The server could not be reached while refreshing.
    #[error("no reachable servers")]
    Unreachable,

    /// The session's link is broken.
    #[error("connection lost: EOF")]
    ConnectionLost,

    /// The session was used after being closed.
    #[error("session already closed")]
    SessionClosed,

    /// The requested document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionFault for MockError {
    fn is_connection_lost(&self) -> bool {
        match self {
            Self::ConnectionLost | Self::SessionClosed | Self::Unreachable => true,
            Self::Io(e) => e.is_connection_lost(),
            Self::Dial(_) | Self::NotFound(_) => false,
        }
    }
}

/// Result type for mock cluster operations.
pub type Result<T> = std::result::Result<T, MockError>;

/// Mock cluster configuration.
#[derive(Debug, Clone, Default)]
pub struct MockClusterConfig {
    /// Dial error to return, if dialing should fail.
    pub dial_failure: Option<String>,
    /// Delay before a dial completes.
    pub dial_delay: Duration,
    /// Delay for each session operation.
    pub operation_delay: Duration,
    /// Delay before each refresh attempt completes.
    pub refresh_delay: Duration,
    /// Number of refresh attempts to fail even when the cluster is online.
    pub refresh_failures: usize,
    /// Whether the cluster starts unreachable.
    pub start_offline: bool,
}

/// Builder for mock cluster configuration.
#[derive(Debug, Default)]
pub struct MockClusterBuilder {
    config: MockClusterConfig,
}

impl MockClusterBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every dial fail with `reason`.
    pub fn dial_failure(mut self, reason: impl Into<String>) -> Self {
        self.config.dial_failure = Some(reason.into());
        self
    }

    /// Delay every dial.
    pub fn dial_delay(mut self, delay: Duration) -> Self {
        self.config.dial_delay = delay;
        self
    }

    /// Delay every session operation.
    pub fn operation_delay(mut self, delay: Duration) -> Self {
        self.config.operation_delay = delay;
        self
    }

    /// Delay every refresh attempt.
    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.config.refresh_delay = delay;
        self
    }

    /// Fail the next `count` refresh attempts.
    pub fn refresh_failures(mut self, count: usize) -> Self {
        self.config.refresh_failures = count;
        self
    }

    /// Start with the cluster unreachable.
    pub fn offline(mut self) -> Self {
        self.config.start_offline = true;
        self
    }

    /// Build the cluster.
    pub fn build(self) -> MockCluster {
        MockCluster::new(self.config)
    }
}

struct ClusterState {
    config: MockClusterConfig,
    online: AtomicBool,
    // Sessions derived before this generation are broken.
    valid_from: AtomicU64,
    generation: AtomicU64,
    refresh_failures_left: AtomicUsize,
    refresh_delay: Mutex<Duration>,
    next_session_id: AtomicU64,
    dials: AtomicUsize,
    refreshes: AtomicUsize,
    sessions_created: AtomicUsize,
    sessions_closed: AtomicUsize,
    pool_limit: AtomicUsize,
    masters_closed: AtomicUsize,
    closed_sessions: Mutex<HashSet<u64>>,
    documents: Mutex<HashMap<String, String>>,
}

impl fmt::Debug for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterState")
            .field("online", &self.online)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// An in-memory document cluster implementing [`Connector`].
///
/// Cloning yields another handle to the same cluster, so tests can keep one
/// handle for fault injection while the pool owns another.
#[derive(Clone)]
pub struct MockCluster {
    state: Arc<ClusterState>,
}

impl MockCluster {
    /// Create a new builder for the mock cluster.
    pub fn builder() -> MockClusterBuilder {
        MockClusterBuilder::new()
    }

    /// Create a cluster from a configuration.
    pub fn new(config: MockClusterConfig) -> Self {
        let online = !config.start_offline;
        let refresh_failures = config.refresh_failures;
        let refresh_delay = config.refresh_delay;
        Self {
            state: Arc::new(ClusterState {
                config,
                online: AtomicBool::new(online),
                valid_from: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                refresh_failures_left: AtomicUsize::new(refresh_failures),
                refresh_delay: Mutex::new(refresh_delay),
                next_session_id: AtomicU64::new(1),
                dials: AtomicUsize::new(0),
                refreshes: AtomicUsize::new(0),
                sessions_created: AtomicUsize::new(0),
                sessions_closed: AtomicUsize::new(0),
                pool_limit: AtomicUsize::new(0),
                masters_closed: AtomicUsize::new(0),
                closed_sessions: Mutex::new(HashSet::new()),
                documents: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Make the cluster unreachable and break every existing session.
    pub fn go_offline(&self) {
        self.state.online.store(false, Ordering::SeqCst);
        self.kill_connections();
        tracing::debug!("mock cluster offline");
    }

    /// Make the cluster reachable again.
    ///
    /// Sessions broken while offline stay broken until the master connection
    /// is refreshed.
    pub fn go_online(&self) {
        self.state.online.store(true, Ordering::SeqCst);
        tracing::debug!("mock cluster online");
    }

    /// Break every existing session without taking the cluster down.
    pub fn kill_connections(&self) {
        let next = self.state.generation.load(Ordering::SeqCst) + 1;
        self.state.valid_from.store(next, Ordering::SeqCst);
    }

    /// Fail the next `count` refresh attempts.
    pub fn fail_refreshes(&self, count: usize) {
        self.state
            .refresh_failures_left
            .store(count, Ordering::SeqCst);
    }

    /// Change how long each refresh attempt takes from now on.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock() = delay;
    }

    /// Check if the cluster is reachable.
    pub fn is_online(&self) -> bool {
        self.state.online.load(Ordering::SeqCst)
    }

    /// Number of successful dials.
    pub fn dial_count(&self) -> usize {
        self.state.dials.load(Ordering::SeqCst)
    }

    /// Number of refresh attempts, successful or not.
    pub fn refresh_count(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }

    /// Number of sessions derived from any master connection.
    pub fn sessions_created(&self) -> usize {
        self.state.sessions_created.load(Ordering::SeqCst)
    }

    /// Number of sessions closed.
    pub fn sessions_closed(&self) -> usize {
        self.state.sessions_closed.load(Ordering::SeqCst)
    }

    /// Number of sessions derived and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.sessions_created()
            .saturating_sub(self.sessions_closed())
    }

    /// Check if the session with `id` was closed.
    pub fn is_session_closed(&self, id: u64) -> bool {
        self.state.closed_sessions.lock().contains(&id)
    }

    /// Pool limit last set on a master connection.
    pub fn pool_limit(&self) -> usize {
        self.state.pool_limit.load(Ordering::SeqCst)
    }

    /// Number of master connections closed.
    pub fn masters_closed(&self) -> usize {
        self.state.masters_closed.load(Ordering::SeqCst)
    }

    /// Current link generation, bumped by each successful refresh.
    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::SeqCst)
    }

    /// Read a stored document directly.
    pub fn document(&self, key: &str) -> Option<String> {
        self.state.documents.lock().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl Connector for MockCluster {
    type Master = MockMaster;
    type Error = MockError;

    async fn dial(&self, hosts: &str) -> Result<MockMaster> {
        let config = &self.state.config;
        if !config.dial_delay.is_zero() {
            tokio::time::sleep(config.dial_delay).await;
        }
        if let Some(reason) = &config.dial_failure {
            return Err(MockError::Dial(reason.clone()));
        }
        if !self.is_online() {
            return Err(MockError::Dial(format!("no reachable servers at {hosts}")));
        }

        self.state.dials.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%hosts, "mock master connection dialed");
        Ok(MockMaster {
            state: Arc::clone(&self.state),
        })
    }
}

/// Master connection to a [`MockCluster`].
pub struct MockMaster {
    state: Arc<ClusterState>,
}

#[async_trait::async_trait]
impl MasterConnection for MockMaster {
    type Session = MockSession;
    type Error = MockError;

    fn set_pool_limit(&self, limit: usize) {
        self.state.pool_limit.store(limit, Ordering::SeqCst);
    }

    fn copy(&self) -> MockSession {
        let id = self.state.next_session_id.fetch_add(1, Ordering::SeqCst);
        self.state.sessions_created.fetch_add(1, Ordering::SeqCst);
        MockSession {
            id,
            generation: self.state.generation.load(Ordering::SeqCst),
            state: Arc::clone(&self.state),
        }
    }

    async fn refresh(&self) -> Result<()> {
        self.state.refreshes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.state.online.load(Ordering::SeqCst) {
            return Err(MockError::Unreachable);
        }
        let forced = self
            .state
            .refresh_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if forced {
            return Err(MockError::Unreachable);
        }

        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, "mock master connection refreshed");
        Ok(())
    }

    fn close(self) {
        self.state.masters_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A session handle leased from the pool.
#[derive(Debug)]
pub struct MockSession {
    id: u64,
    generation: u64,
    state: Arc<ClusterState>,
}

impl MockSession {
    /// Unique session identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Link generation the session was derived from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Insert or replace a document.
    pub async fn upsert(&self, key: &str, value: &str) -> Result<()> {
        self.check_link().await?;
        self.state
            .documents
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Fetch a document by key.
    pub async fn find(&self, key: &str) -> Result<String> {
        self.check_link().await?;
        self.state
            .documents
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| MockError::NotFound(key.to_string()))
    }

    async fn check_link(&self) -> Result<()> {
        let delay = self.state.config.operation_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.closed_sessions.lock().contains(&self.id) {
            return Err(MockError::SessionClosed);
        }
        let broken = !self.state.online.load(Ordering::SeqCst)
            || self.generation < self.state.valid_from.load(Ordering::SeqCst);
        if broken {
            return Err(MockError::ConnectionLost);
        }
        Ok(())
    }
}

impl Session for MockSession {
    fn close(self) {
        self.state.sessions_closed.fetch_add(1, Ordering::SeqCst);
        self.state.closed_sessions.lock().insert(self.id);
    }
}
