//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Number of sessions used when a capacity of zero is supplied.
pub const DEFAULT_MAX_SESSIONS: usize = 3;

/// Default bound on dialing the master connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default wait used by [`Pool::acquire`](crate::Pool::acquire).
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between draining the pool and refreshing the master connection.
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(5);

/// Configuration for the session pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Number of sessions kept by the pool. Zero means [`DEFAULT_MAX_SESSIONS`].
    pub max_sessions: usize,

    /// Time allowed for dialing the master connection.
    pub connect_timeout: Duration,

    /// Time [`Pool::acquire`](crate::Pool::acquire) waits for a session.
    pub acquire_timeout: Duration,

    /// Pause before refreshing the master connection during a reconnect pass.
    ///
    /// Also used between refresh attempts while the server stays unreachable,
    /// so it must be non-zero.
    pub reconnect_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            reconnect_cooldown: DEFAULT_RECONNECT_COOLDOWN,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pooled sessions.
    #[must_use]
    pub fn max_sessions(mut self, count: usize) -> Self {
        self.max_sessions = count;
        self
    }

    /// Set the master connection dial timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default session acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the reconnect cool-down interval.
    #[must_use]
    pub fn reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.reconnect_cooldown = cooldown;
        self
    }

    /// The capacity the pool actually uses, with zero coerced to the default.
    #[must_use]
    pub fn capacity(&self) -> usize {
        if self.max_sessions == 0 {
            DEFAULT_MAX_SESSIONS
        } else {
            self.max_sessions
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.connect_timeout.is_zero() {
            return Err(PoolError::Configuration(
                "connect_timeout must be greater than 0".into(),
            ));
        }
        if self.reconnect_cooldown.is_zero() {
            return Err(PoolError::Configuration(
                "reconnect_cooldown must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
