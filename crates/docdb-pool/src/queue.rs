//! Bounded concurrent queue of ready sessions.
//!
//! A semaphore counts the items that can be taken and is what waiting
//! callers park on. The deque behind it is locked only for the O(1) push or
//! pop, never across an await, so returning a session never waits on a
//! caller that is blocked acquiring one.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};

/// Why a pop did not yield an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PopError {
    /// The wait elapsed with the queue still empty.
    Timeout,
    /// The queue was closed.
    Closed,
}

struct Slots<S> {
    items: VecDeque<S>,
    closed: bool,
}

pub(crate) struct SessionQueue<S> {
    slots: Mutex<Slots<S>>,
    // One permit per queued item.
    ready: Semaphore,
    capacity: usize,
}

impl<S> SessionQueue<S> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Semaphore::new(0),
            capacity,
        }
    }

    /// Enqueue an item without waiting.
    ///
    /// Hands the item back if the queue is full or closed.
    pub(crate) fn push(&self, item: S) -> Result<(), S> {
        {
            let mut slots = self.slots.lock();
            if slots.closed || slots.items.len() >= self.capacity {
                return Err(item);
            }
            slots.items.push_back(item);
        }
        self.ready.add_permits(1);
        Ok(())
    }

    /// Take the oldest item, waiting up to `timeout` (forever when `None`).
    ///
    /// A zero timeout never suspends.
    pub(crate) async fn pop(&self, timeout: Option<Duration>) -> Result<S, PopError> {
        let permit = match self.ready.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(PopError::Closed),
            Err(TryAcquireError::NoPermits) => match timeout {
                Some(timeout) if timeout.is_zero() => return Err(PopError::Timeout),
                Some(timeout) => tokio::time::timeout(timeout, self.ready.acquire())
                    .await
                    .map_err(|_| PopError::Timeout)?
                    .map_err(|_| PopError::Closed)?,
                None => self
                    .ready
                    .acquire()
                    .await
                    .map_err(|_| PopError::Closed)?,
            },
        };
        permit.forget();

        // Only a concurrent close can empty the deque under a held permit.
        self.slots.lock().items.pop_front().ok_or(PopError::Closed)
    }

    /// Close the queue, waking every waiter, and return what was still queued.
    pub(crate) fn close(&self) -> Vec<S> {
        let drained = {
            let mut slots = self.slots.lock();
            slots.closed = true;
            slots.items.drain(..).collect()
        };
        self.ready.close();
        drained
    }

    /// Number of items ready to be taken.
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().items.len()
    }
}
