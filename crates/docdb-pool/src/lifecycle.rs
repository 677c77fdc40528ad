//! Transport traits and pool lifecycle state.
//!
//! The pool never speaks the database protocol itself. A driver plugs in by
//! implementing [`Connector`] (dial the cluster), [`MasterConnection`] (the
//! dialed link that hands out sessions) and [`Session`] (one leasable handle).
//!
//! The async methods use `#[async_trait]` so the reconnect pass, which holds
//! a master connection across awaits, can run on a multi-threaded runtime.

use std::fmt;

/// Dials the master connection to a database cluster.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The dialed link.
    type Master: MasterConnection;

    /// Error returned when dialing fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Dial the cluster described by `hosts`.
    ///
    /// The pool bounds this call with its connect timeout, so implementations
    /// need not apply their own.
    async fn dial(&self, hosts: &str) -> Result<Self::Master, Self::Error>;
}

/// The shared link from which session handles are derived.
#[async_trait::async_trait]
pub trait MasterConnection: Send + Sync + 'static {
    /// Handle type leased to callers.
    type Session: Session;

    /// Error returned when refreshing the link fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Cap the number of underlying sockets the link may open.
    fn set_pool_limit(&self, limit: usize);

    /// Derive a new session handle from this link.
    fn copy(&self) -> Self::Session;

    /// Discard broken sockets and re-establish the link.
    async fn refresh(&self) -> Result<(), Self::Error>;

    /// Close the link.
    fn close(self);
}

/// One leasable session handle.
///
/// Closing consumes the handle, so a closed session can never re-enter the pool.
pub trait Session: Send + 'static {
    /// Close the session and release its resources.
    fn close(self);
}

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PoolState {
    /// Constructed, [`Pool::run`](crate::Pool::run) has not succeeded yet.
    Uninitialized,
    /// Master connection established and sessions in rotation.
    Ready,
    /// A reconnect pass is draining and regenerating sessions.
    Reconnecting,
    /// The pool was shut down.
    Closed,
}

impl PoolState {
    /// Check if sessions can currently be acquired.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
