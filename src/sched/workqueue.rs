//! Thread-safe FIFO of work items with cooperative shutdown.
//!
//! Items move producer → queue → consumer by value; exactly one owner holds
//! an item at any time. `close` stops accepting pushes but lets already
//! queued items drain before blocked consumers are released.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use thiserror::Error;

/// Push rejected because the queue was closed. Carries the item back to the
/// caller so ownership is never silently dropped; the caller must not assume
/// the work was scheduled.
#[derive(Debug, Error)]
#[error("work queue is closed")]
pub struct QueueClosed<T>(pub T);

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Append at the tail and wake one waiting consumer.
    pub fn push(&self, item: T) -> Result<(), QueueClosed<T>> {
        let mut inner = self.inner.lock().expect("work queue lock poisoned");
        if inner.closed {
            return Err(QueueClosed(item));
        }
        inner.items.push_back(item);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until an item is available or the queue is closed and drained.
    /// Returns `None` only in the latter case.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut inner = self.inner.lock().expect("work queue lock poisoned");
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .ready
                .wait(inner)
                .expect("work queue lock poisoned");
        }
    }

    /// Stop accepting pushes and wake every blocked consumer. Items already
    /// queued are still delivered until the queue is drained.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("work queue lock poisoned");
        inner.closed = true;
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("work queue lock poisoned")
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .expect("work queue lock poisoned")
            .closed
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
