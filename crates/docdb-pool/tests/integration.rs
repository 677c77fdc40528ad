//! Session pool integration tests against the in-memory mock cluster.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p docdb-pool --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use docdb_pool::{Pool, PoolConfig, PoolError, PoolState};
use docdb_testing::fixtures::{self, MOCK_HOSTS};
use docdb_testing::{MockCluster, MockError};
use tokio::time::Instant;
use tokio_test::{assert_pending, assert_ready, task};

fn ok() -> Result<(), MockError> {
    Ok(())
}

async fn running_pool(cluster: &MockCluster, max_sessions: usize) -> Pool<MockCluster> {
    fixtures::init_tracing();
    let pool = fixtures::mock_pool(cluster, max_sessions).expect("valid config");
    pool.run().await.expect("mock cluster should accept dial");
    pool
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_run_fills_pool_to_capacity() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 4).await;

    let status = pool.status();
    assert_eq!(status.state, PoolState::Ready);
    assert_eq!(status.capacity, 4);
    assert_eq!(status.available, 4);
    assert_eq!(status.leased, 0);

    assert_eq!(cluster.dial_count(), 1);
    assert_eq!(cluster.sessions_created(), 4);
    assert_eq!(cluster.pool_limit(), 4);
}

#[tokio::test]
async fn test_zero_capacity_falls_back_to_default() {
    let cluster = MockCluster::builder().build();
    let pool = Pool::new(cluster.clone(), MOCK_HOSTS, 0);
    pool.run().await.unwrap();

    assert_eq!(pool.capacity(), 3);
    assert_eq!(pool.status().available, 3);
    assert_eq!(cluster.pool_limit(), 3);
}

#[tokio::test]
async fn test_dial_failure_is_fatal() {
    fixtures::init_tracing();
    let cluster = MockCluster::builder().dial_failure("connection refused").build();
    let pool = fixtures::mock_pool(&cluster, 2).unwrap();

    let err = pool.run().await.unwrap_err();
    assert!(err.is_fatal());
    match err {
        PoolError::Connect { hosts, reason } => {
            assert_eq!(hosts, MOCK_HOSTS);
            assert!(reason.contains("connection refused"));
        }
        other => panic!("expected Connect, got {other:?}"),
    }

    assert_eq!(pool.state(), PoolState::Uninitialized);
    assert_eq!(cluster.sessions_created(), 0);
    assert!(matches!(pool.acquire().await, Err(PoolError::NoServer)));
}

#[tokio::test(start_paused = true)]
async fn test_dial_is_bounded_by_connect_timeout() {
    let cluster = MockCluster::builder()
        .dial_delay(Duration::from_secs(10))
        .build();
    let config = PoolConfig::new()
        .max_sessions(2)
        .connect_timeout(Duration::from_secs(3));
    let pool = Pool::with_config(cluster.clone(), MOCK_HOSTS, config).unwrap();

    let started = Instant::now();
    let err = pool.run().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(err.to_string().contains("timed out"));
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let cluster = MockCluster::builder().build();
    let config = PoolConfig::new().connect_timeout(Duration::ZERO);

    let err = Pool::with_config(cluster, MOCK_HOSTS, config).unwrap_err();
    assert!(matches!(err, PoolError::Configuration(_)));
}

#[tokio::test]
async fn test_zero_cooldown_is_rejected() {
    let cluster = MockCluster::builder().build();
    let config = PoolConfig::new().reconnect_cooldown(Duration::ZERO);

    let err = Pool::with_config(cluster.clone(), MOCK_HOSTS, config).unwrap_err();
    assert!(matches!(err, PoolError::Configuration(_)));
    assert_eq!(cluster.dial_count(), 0);
}

/// Scenario B: acquiring while `run` has not completed fails without blocking.
#[tokio::test(start_paused = true)]
async fn test_acquire_before_run_completes_is_no_server() {
    fixtures::init_tracing();
    let cluster = MockCluster::builder()
        .dial_delay(Duration::from_millis(300))
        .build();
    let pool = fixtures::mock_pool(&cluster, 2).unwrap();

    let starting = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run().await }
    });
    tokio::task::yield_now().await;

    let mut acquire = task::spawn(pool.acquire_timeout(Duration::from_secs(5)));
    let result = assert_ready!(acquire.poll());
    assert!(matches!(result, Err(PoolError::NoServer)));
    drop(acquire);

    starting.await.unwrap().unwrap();
    assert!(pool.acquire().await.is_ok());
    assert_eq!(pool.metrics().snapshot().no_server_rejections, 1);
}

#[tokio::test]
async fn test_run_twice_does_not_redial() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 2).await;

    assert!(matches!(pool.run().await, Err(PoolError::AlreadyRunning)));
    assert_eq!(cluster.dial_count(), 1);
    assert_eq!(cluster.sessions_created(), 2);
}

// =============================================================================
// Acquire / release
// =============================================================================

#[tokio::test]
async fn test_capacity_acquires_then_blocks() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 3).await;

    let mut leased = Vec::new();
    for _ in 0..3 {
        let mut acquire = task::spawn(pool.acquire());
        leased.push(assert_ready!(acquire.poll()).unwrap());
    }
    assert_eq!(pool.status().leased, 3);

    let mut blocked = task::spawn(pool.acquire_timeout(Duration::from_secs(5)));
    assert_pending!(blocked.poll());

    let returned = leased.pop().unwrap();
    let returned_id = returned.id();
    pool.release(returned, &ok());

    assert!(blocked.is_woken());
    let session = assert_ready!(blocked.poll()).unwrap();
    assert_eq!(session.id(), returned_id);
}

/// Scenario A: capacity 2, a third acquire times out, a release unblocks.
#[tokio::test(start_paused = true)]
async fn test_acquire_timeout_then_release() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 2).await;

    let first = pool.acquire().await.unwrap();
    let _second = pool.acquire().await.unwrap();

    let started = Instant::now();
    let err = pool
        .acquire_timeout(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::AcquireTimeout(d) if d == Duration::from_millis(100)));
    assert!(err.is_transient());
    assert!(started.elapsed() >= Duration::from_millis(100));

    pool.release(first, &ok());
    assert!(pool.acquire_timeout(Duration::from_millis(100)).await.is_ok());
    assert_eq!(pool.metrics().snapshot().acquire_timeouts, 1);
}

#[tokio::test]
async fn test_zero_timeout_on_empty_pool_does_not_wait() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 1).await;
    let _held = pool.acquire().await.unwrap();

    let mut acquire = task::spawn(pool.acquire_timeout(Duration::ZERO));
    let result = assert_ready!(acquire.poll());
    assert!(matches!(result, Err(PoolError::AcquireTimeout(d)) if d.is_zero()));
}

#[tokio::test]
async fn test_release_returns_the_same_session() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 1).await;

    let session = pool.acquire().await.unwrap();
    let id = session.id();
    let result = session.upsert("user:1", "alice").await;
    pool.release(session, &result);

    let again = pool.acquire().await.unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(cluster.sessions_created(), 1);
    assert_eq!(cluster.document("user:1").as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_application_error_keeps_session_without_reconnect() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 2).await;

    let session = pool.acquire().await.unwrap();
    let result = session.find("missing").await;
    assert!(matches!(result, Err(MockError::NotFound(_))));
    pool.release(session, &result);

    assert_eq!(pool.state(), PoolState::Ready);
    assert_eq!(pool.status().available, 2);
    assert_eq!(pool.metrics().reconnects_started(), 0);
}

#[tokio::test]
async fn test_benign_pool_error_does_not_reconnect() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 1).await;

    let session = pool.acquire().await.unwrap();
    let outcome: Result<(), PoolError> = Err(PoolError::AcquireTimeout(Duration::ZERO));
    pool.release(session, &outcome);

    assert_eq!(pool.state(), PoolState::Ready);
    assert_eq!(pool.metrics().reconnects_started(), 0);
    assert_eq!(pool.status().available, 1);
}

#[tokio::test]
async fn test_foreign_session_is_closed_not_queued() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 1).await;
    let other = running_pool(&cluster, 1).await;

    let foreign = other.acquire().await.unwrap();
    let foreign_id = foreign.id();
    pool.release(foreign, &ok());

    assert_eq!(pool.status().available, 1);
    assert!(cluster.is_session_closed(foreign_id));
}

#[tokio::test]
async fn test_surplus_close_does_not_hide_leases() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 1).await;
    let other = running_pool(&cluster, 1).await;

    let foreign = other.acquire().await.unwrap();
    pool.release(foreign, &ok());

    let own = pool.acquire().await.unwrap();
    let status = pool.status();
    assert_eq!(status.available, 0);
    assert_eq!(status.leased, 1);

    let metrics = pool.metrics().snapshot();
    assert_eq!(metrics.surplus_closed, 1);
    assert_eq!(metrics.sessions_closed, 0);

    pool.release(own, &ok());
    assert_eq!(pool.status().leased, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_never_exceed_capacity_under_load() {
    const CAPACITY: usize = 3;
    const WORKERS: usize = 16;
    const ROUNDS: usize = 25;

    let cluster = MockCluster::builder()
        .operation_delay(Duration::from_millis(1))
        .build();
    let pool = running_pool(&cluster, CAPACITY).await;
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let mut seen = HashSet::new();
            for round in 0..ROUNDS {
                let session = pool
                    .acquire_timeout(Duration::from_secs(10))
                    .await
                    .expect("session should become available");
                let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                seen.insert(session.id());

                let result = session
                    .upsert(&format!("w{worker}"), &round.to_string())
                    .await;
                in_use.fetch_sub(1, Ordering::SeqCst);
                pool.release(session, &result);
            }
            seen
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.extend(handle.await.unwrap());
    }

    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    assert_eq!(ids.len(), CAPACITY);
    assert_eq!(cluster.sessions_created(), CAPACITY);
    assert_eq!(pool.status().available, CAPACITY);
    assert_eq!(
        pool.metrics().snapshot().acquired,
        (WORKERS * ROUNDS) as u64
    );
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_close_releases_everything() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 3).await;
    let leased = pool.acquire().await.unwrap();

    pool.close().await;
    assert!(pool.is_closed());
    assert_eq!(pool.status().available, 0);
    assert_eq!(cluster.open_sessions(), 1);
    assert_eq!(cluster.masters_closed(), 1);

    // Late release closes the handle instead of queueing it.
    let id = leased.id();
    pool.release(leased, &ok());
    assert!(cluster.is_session_closed(id));
    assert_eq!(cluster.open_sessions(), 0);

    assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));
    assert!(matches!(pool.run().await, Err(PoolError::PoolClosed)));

    // Second close is a no-op.
    pool.close().await;
    assert_eq!(cluster.masters_closed(), 1);
}

#[tokio::test]
async fn test_close_wakes_blocked_acquirers() {
    let cluster = MockCluster::builder().build();
    let pool = running_pool(&cluster, 1).await;
    let _held = pool.acquire().await.unwrap();

    let mut blocked = task::spawn(pool.acquire_timeout(Duration::from_secs(30)));
    assert_pending!(blocked.poll());

    pool.close().await;
    assert!(blocked.is_woken());
    let result = assert_ready!(blocked.poll());
    assert!(matches!(result, Err(PoolError::PoolClosed)));
}
