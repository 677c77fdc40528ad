//! Background reconnect pass.
//!
//! A pass runs as one detached task:
//!
//! 1. take the master connection out of the pool (acquire now reports
//!    `NoServer`),
//! 2. drain and close exactly `capacity` sessions,
//! 3. cool down,
//! 4. refresh the master connection, bounded by the connect timeout,
//!    repeating 3-4 until it succeeds,
//! 5. regenerate `capacity` sessions,
//! 6. publish the master connection again under the pool mutex.
//!
//! Step 2 waits for every leased session to be released: a pass cannot
//! complete while any session is still out. Shutdown cancels the pass at
//! any await point.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::Instrument;

use crate::lifecycle::{Connector, MasterConnection, PoolState};
use crate::pool::PoolInner;

/// Start a reconnect pass unless one is already running.
///
/// The state check and the transition to `Reconnecting` happen under the
/// pool mutex, so concurrent callers start at most one pass.
pub(crate) fn schedule<C: Connector>(inner: &Arc<PoolInner<C>>) {
    let mut shared = inner.shared.lock();
    match shared.state {
        PoolState::Ready => {}
        PoolState::Reconnecting => {
            tracing::debug!("reconnect already in flight");
            return;
        }
        state => {
            tracing::debug!(%state, "pool not running, reconnect skipped");
            return;
        }
    }

    // Prefer the caller's runtime: the one recorded by `run` may have shut down.
    let Some(runtime) = Handle::try_current().ok().or_else(|| shared.runtime.clone()) else {
        tracing::warn!("no async runtime available, reconnect skipped");
        return;
    };
    let Some(master) = shared.master.take() else {
        return;
    };

    shared.state = PoolState::Reconnecting;
    inner.metrics.record_reconnect_started();

    let span = tracing::info_span!("reconnect", hosts = %inner.hosts);
    let task = runtime.spawn(run_pass(Arc::clone(inner), master).instrument(span));
    shared.reconnect_task = Some(task);
}

async fn run_pass<C: Connector>(inner: Arc<PoolInner<C>>, master: C::Master) {
    tracing::info!(sessions = inner.capacity, "reconnect pass started");

    let restored = tokio::select! {
        biased;
        () = inner.shutdown.cancelled() => false,
        restored = restore(&inner, &master) => restored,
    };

    if !restored {
        tracing::debug!("reconnect pass cancelled by shutdown");
        master.close();
        return;
    }

    let mut shared = inner.shared.lock();
    if shared.state == PoolState::Closed {
        drop(shared);
        master.close();
        return;
    }
    shared.master = Some(master);
    shared.state = PoolState::Ready;
    shared.reconnect_task = None;
    drop(shared);

    inner.metrics.record_reconnect_completed();
    tracing::info!("reconnect pass completed, pool ready");
}

/// Returns `false` if the queue was closed underneath the pass.
async fn restore<C: Connector>(inner: &PoolInner<C>, master: &C::Master) -> bool {
    for _ in 0..inner.capacity {
        match inner.queue.pop(None).await {
            Ok(session) => inner.discard(session),
            Err(_) => return false,
        }
    }
    tracing::debug!(closed = inner.capacity, "drained every session");

    let cooldown = inner.config.reconnect_cooldown;
    let limit = inner.config.connect_timeout;
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(cooldown).await;
        let reason = match tokio::time::timeout(limit, master.refresh()).await {
            Ok(Ok(())) => break,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {limit:?}"),
        };
        inner.metrics.record_refresh_failure();
        tracing::warn!(attempt, ?cooldown, %reason, "master connection refresh failed, retrying");
    }

    let filled = inner.fill(master);
    tracing::debug!(filled, attempts = attempt, "sessions regenerated");
    true
}
