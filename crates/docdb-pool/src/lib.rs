//! # docdb-pool
//!
//! Bounded session pool for document databases with automatic reconnect.
//!
//! The pool dials one master connection, derives a fixed number of session
//! handles from it and leases them to callers. It caps how many sessions can
//! hit the database at once and heals itself when the transport breaks.
//!
//! ## Features
//!
//! - Hard cap on outstanding sessions (leased + queued)
//! - Bounded waits on acquisition, immediate failure when no server is up
//! - Reconnect on transport failure reported through `release`, with
//!   concurrent failures collapsed into one pass
//! - Deterministic shutdown that cancels a running reconnect pass
//! - Transport-agnostic: drivers plug in through [`Connector`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use docdb_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .max_sessions(10)
//!     .acquire_timeout(Duration::from_secs(2));
//!
//! let pool = Pool::with_config(connector, "127.0.0.1:27017", config)?;
//! pool.run().await?;
//!
//! let session = pool.acquire().await?;
//! let result = session.upsert("users", doc).await;
//! pool.release(session, &result);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod pool;
mod queue;
mod reconnect;

pub use config::PoolConfig;
pub use error::{ConnectionFault, PoolError, is_connection_lost_error};
pub use lifecycle::{Connector, MasterConnection, PoolState, Session};
pub use metrics::{MetricsSnapshot, PoolMetrics};
pub use pool::{Pool, PoolStatus, SessionOf};
