//! Periodic save loop with an outage in the middle.
//!
//! A ticker fires every 10ms and spawns a burst of workers that each lease a
//! session, upsert a document and hand the session back. Halfway through,
//! the mock cluster goes offline for a second; the pool reconnects on its
//! own once it comes back.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=docdb_pool=info cargo run -p docdb-pool --example save_loop
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use docdb_pool::{Pool, PoolConfig};
use docdb_testing::MockCluster;
use docdb_testing::fixtures;
use tokio::time::{Instant, interval, sleep};

const WORKERS_PER_TICK: usize = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fixtures::init_tracing();

    println!("=== Session Pool Save Loop Example ===\n");

    let cluster = MockCluster::builder()
        .operation_delay(Duration::from_millis(2))
        .build();

    let pool_config = PoolConfig::new()
        .max_sessions(4)
        .acquire_timeout(Duration::from_millis(50))
        .reconnect_cooldown(Duration::from_millis(500));

    println!("Pool configuration:");
    println!("  Max sessions: {}", pool_config.capacity());
    println!("  Acquire timeout: {:?}", pool_config.acquire_timeout);
    println!("  Reconnect cool-down: {:?}", pool_config.reconnect_cooldown);
    println!();

    let pool = Pool::with_config(cluster.clone(), fixtures::MOCK_HOSTS, pool_config)?;
    if let Err(e) = pool.run().await {
        // Nothing can be served without a master connection.
        eprintln!("startup failed: {e}");
        std::process::exit(1);
    }

    let saved = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));

    let ticker = tokio::spawn(save_loop(pool.clone(), Arc::clone(&saved), Arc::clone(&failed)));

    let started = Instant::now();
    sleep(Duration::from_secs(1)).await;
    print_status(&pool, started);

    println!("\n-- cluster goes offline --");
    cluster.go_offline();
    sleep(Duration::from_secs(1)).await;
    print_status(&pool, started);

    println!("\n-- cluster back online --");
    cluster.go_online();
    sleep(Duration::from_secs(2)).await;
    print_status(&pool, started);

    ticker.abort();
    pool.close().await;

    println!("\nSaved: {}", saved.load(Ordering::Relaxed));
    println!("Failed: {}", failed.load(Ordering::Relaxed));
    let metrics = pool.metrics().snapshot();
    println!("Reconnect passes: {}", metrics.reconnects_completed);
    println!("Sessions created: {}", metrics.sessions_created);
    println!("Sessions closed: {}", metrics.sessions_closed);

    Ok(())
}

async fn save_loop(pool: Pool<MockCluster>, saved: Arc<AtomicU64>, failed: Arc<AtomicU64>) {
    let mut tick = interval(Duration::from_millis(10));
    let mut round: u64 = 0;
    loop {
        tick.tick().await;
        round += 1;
        for worker in 0..WORKERS_PER_TICK {
            let pool = pool.clone();
            let saved = Arc::clone(&saved);
            let failed = Arc::clone(&failed);
            tokio::spawn(async move {
                match save_login(&pool, worker, round).await {
                    Ok(()) => saved.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
            });
        }
    }
}

async fn save_login(
    pool: &Pool<MockCluster>,
    worker: usize,
    round: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Timeouts and NoServer during an outage are expected; the caller counts them.
    let session = pool.acquire().await?;

    let result = session
        .upsert(&format!("login:{worker}"), &round.to_string())
        .await;
    pool.release(session, &result);
    result.map_err(Into::into)
}

fn print_status(pool: &Pool<MockCluster>, started: Instant) {
    let status = pool.status();
    println!(
        "  [{:>5}ms] state={} leased={}/{} available={} ({:.1}% utilization)",
        started.elapsed().as_millis(),
        status.state,
        status.leased,
        status.capacity,
        status.available,
        status.utilization()
    );
}
