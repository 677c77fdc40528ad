//! # docdb-testing
//!
//! Test infrastructure for `docdb-pool`.
//!
//! This crate provides an in-memory mock cluster that implements the pool's
//! transport traits, so pool behavior can be exercised without a database.
//!
//! ## Features
//!
//! - Mock cluster with dial, refresh and session operations
//! - Fault injection: offline cluster, killed connections, failing refreshes,
//!   slow dials and operations
//! - Counters for dials, refreshes, sessions created and closed
//! - Fixtures for tracing setup and fast pool configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use docdb_testing::{MockCluster, fixtures};
//!
//! #[tokio::test]
//! async fn test_with_mock_cluster() {
//!     let cluster = MockCluster::builder().build();
//!     let pool = fixtures::mock_pool(&cluster, 2).unwrap();
//!     pool.run().await.unwrap();
//!
//!     let session = pool.acquire().await.unwrap();
//!     let result = session.upsert("k", "v").await;
//!     pool.release(session, &result);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_cluster;

pub use mock_cluster::{
    MockCluster, MockClusterBuilder, MockClusterConfig, MockError, MockMaster, MockSession,
};
