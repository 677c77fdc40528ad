//! Pool error types.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Dialing the master connection failed during [`Pool::run`].
    ///
    /// This is the only unrecoverable pool error: no session can ever be
    /// served, so the caller should abort startup.
    ///
    /// [`Pool::run`]: crate::Pool::run
    #[error("failed to connect to {hosts}: {reason}")]
    Connect {
        /// Target hosts string.
        hosts: String,
        /// Why the dial failed.
        reason: String,
    },

    /// Failed to acquire a session within the timeout.
    #[error("session acquisition timeout after {0:?}")]
    AcquireTimeout(Duration),

    /// The pool has no master connection (not yet running, or reconnecting).
    #[error("no database server available")]
    NoServer,

    /// A leased session observed a broken transport link.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// [`Pool::run`](crate::Pool::run) was called on a pool that already started.
    #[error("pool is already running")]
    AlreadyRunning,

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl PoolError {
    /// Check if this error is transient and the operation may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AcquireTimeout(_) | Self::NoServer | Self::ConnectionLost(_)
        )
    }

    /// Check if this error must stop the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

/// Classifies an error reported through [`Pool::release`](crate::Pool::release).
///
/// Only transport-level failures (a closed link, an unexpected EOF) make the
/// pool reconnect. Application errors such as a missing document leave the
/// session in rotation untouched.
pub trait ConnectionFault {
    /// Returns `true` when the error means the underlying link is broken.
    fn is_connection_lost(&self) -> bool;
}

impl ConnectionFault for PoolError {
    fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

impl ConnectionFault for io::Error {
    fn is_connection_lost(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected
        )
    }
}

impl ConnectionFault for Box<dyn StdError + Send + Sync> {
    fn is_connection_lost(&self) -> bool {
        is_connection_lost_error(self.as_ref())
    }
}

impl<T: ConnectionFault + ?Sized> ConnectionFault for &T {
    fn is_connection_lost(&self) -> bool {
        (**self).is_connection_lost()
    }
}

/// Walk an error's source chain looking for a transport failure.
///
/// Recognizes [`io::Error`] and [`PoolError`] anywhere in the chain, so
/// driver errors that wrap an I/O error are classified correctly.
#[must_use]
pub fn is_connection_lost_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.is_connection_lost() {
                return true;
            }
        }
        if let Some(pool_err) = e.downcast_ref::<PoolError>() {
            if pool_err.is_connection_lost() {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("driver failure")]
    struct DriverError(#[source] io::Error);

    #[test]
    fn test_pool_error_classification() {
        assert!(PoolError::ConnectionLost("eof".into()).is_connection_lost());
        assert!(!PoolError::NoServer.is_connection_lost());
        assert!(!PoolError::AcquireTimeout(Duration::from_secs(1)).is_connection_lost());

        assert!(PoolError::NoServer.is_transient());
        assert!(!PoolError::PoolClosed.is_transient());

        let connect = PoolError::Connect {
            hosts: "127.0.0.1".into(),
            reason: "refused".into(),
        };
        assert!(connect.is_fatal());
        assert!(!connect.is_transient());
    }

    #[test]
    fn test_io_error_classification() {
        assert!(io::Error::from(io::ErrorKind::UnexpectedEof).is_connection_lost());
        assert!(io::Error::from(io::ErrorKind::ConnectionReset).is_connection_lost());
        assert!(!io::Error::from(io::ErrorKind::NotFound).is_connection_lost());
        assert!(!io::Error::from(io::ErrorKind::PermissionDenied).is_connection_lost());
    }

    #[test]
    fn test_source_chain_classification() {
        let wrapped = DriverError(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(is_connection_lost_error(&wrapped));

        let app = DriverError(io::Error::from(io::ErrorKind::InvalidData));
        assert!(!is_connection_lost_error(&app));

        let boxed: Box<dyn StdError + Send + Sync> =
            Box::new(DriverError(io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(boxed.is_connection_lost());
    }

    #[test]
    fn test_error_display() {
        let err = PoolError::Connect {
            hosts: "db1,db2".into(),
            reason: "timed out".into(),
        };
        assert_eq!(err.to_string(), "failed to connect to db1,db2: timed out");
        assert_eq!(PoolError::NoServer.to_string(), "no database server available");
    }
}
