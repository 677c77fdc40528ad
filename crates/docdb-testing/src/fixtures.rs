//! Test fixture utilities.

use std::sync::Once;
use std::time::Duration;

use docdb_pool::{Pool, PoolConfig, PoolError};

use crate::mock_cluster::MockCluster;

/// Hosts string used by pools built from fixtures.
pub const MOCK_HOSTS: &str = "mock-1:27017,mock-2:27017";

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Pool configuration with short timeouts and cool-down, suited to tests.
#[must_use]
pub fn fast_config(max_sessions: usize) -> PoolConfig {
    PoolConfig::new()
        .max_sessions(max_sessions)
        .connect_timeout(Duration::from_millis(500))
        .acquire_timeout(Duration::from_millis(200))
        .reconnect_cooldown(Duration::from_millis(20))
}

/// A pool over `cluster` using [`fast_config`].
pub fn mock_pool(
    cluster: &MockCluster,
    max_sessions: usize,
) -> Result<Pool<MockCluster>, PoolError> {
    Pool::with_config(cluster.clone(), MOCK_HOSTS, fast_config(max_sessions))
}
