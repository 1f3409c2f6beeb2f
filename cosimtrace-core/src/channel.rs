//! Bounded async channel (C4).
//!
//! A fixed-capacity, multi-producer/multi-consumer queue used for every
//! hand-off in the pipeline: parser → spanner event streams and the
//! cross-simulator context queues (§6). `push`/`pop` suspend cooperatively;
//! `close`/`poison` are idempotent and wake every waiter with a terminal
//! result, which is how channel closure propagates end-of-simulation
//! upstream (§5 "Cancellation / shutdown").
//!
//! `close` still lets buffered values drain; `poison` discards them
//! immediately — the distinction the spec draws between a clean shutdown and
//! an error that invalidates in-flight data.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
    poisoned: bool,
}

/// A bounded MPMC channel. Cloning a `BoundedChannel` handle (it is normally
/// held as `Arc<BoundedChannel<T>>`) gives every spanner/parser task its own
/// reference to the same underlying queue.
pub struct BoundedChannel<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
}

/// Why a non-suspending push/pop did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryError {
    /// The channel is at capacity (push) or empty (pop).
    WouldBlock,
    /// The channel is closed or poisoned.
    Closed,
}

impl fmt::Display for TryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryError::WouldBlock => write!(f, "channel operation would block"),
            TryError::Closed => write!(f, "channel closed"),
        }
    }
}

impl<T> BoundedChannel<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "bounded channel capacity must be > 0");
        Arc::new(Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
                poisoned: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    /// Pushes `value`, suspending while the channel is full. Returns `false`
    /// if the channel was or became closed/poisoned before room was
    /// available — `value` is dropped in that case.
    pub async fn push(&self, value: T) -> bool {
        let mut value = Some(value);
        loop {
            let not_full = self.not_full.notified();
            {
                let mut inner = self.inner.lock().await;
                if inner.poisoned || inner.closed {
                    return false;
                }
                if inner.queue.len() < inner.capacity {
                    inner.queue.push_back(value.take().expect("value taken twice"));
                    self.not_empty.notify_one();
                    return true;
                }
            }
            not_full.await;
        }
    }

    /// Non-suspending push.
    pub fn try_push(&self, value: T) -> Result<(), TryError> {
        let mut guard = self.inner.try_lock().map_err(|_| TryError::WouldBlock)?;
        if guard.poisoned || guard.closed {
            return Err(TryError::Closed);
        }
        if guard.queue.len() >= guard.capacity {
            return Err(TryError::WouldBlock);
        }
        guard.queue.push_back(value);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pops the next value, suspending while the channel is empty. Returns
    /// `None` once the channel is drained and closed, or immediately once
    /// poisoned.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let not_empty = self.not_empty.notified();
            {
                let mut inner = self.inner.lock().await;
                if inner.poisoned {
                    return None;
                }
                if let Some(value) = inner.queue.pop_front() {
                    self.not_full.notify_one();
                    return Some(value);
                }
                if inner.closed {
                    return None;
                }
            }
            not_empty.await;
        }
    }

    /// Non-suspending pop.
    pub fn try_pop(&self) -> Option<T> {
        let mut guard = self.inner.try_lock().ok()?;
        if guard.poisoned {
            return None;
        }
        let value = guard.queue.pop_front();
        if value.is_some() {
            drop(guard);
            self.not_full.notify_one();
        }
        value
    }

    /// Pops the front value only if `pred` accepts it. Never suspends: an
    /// empty queue, a poisoned channel, or a rejecting predicate all yield
    /// `None` immediately, matching the original's `TryPopOnTrue` used to
    /// drain only the currently-available causal hand-offs without blocking
    /// on ones that haven't arrived yet.
    pub fn try_pop_if(&self, pred: impl FnOnce(&T) -> bool) -> Option<T> {
        let mut guard = self.inner.try_lock().ok()?;
        if guard.poisoned {
            return None;
        }
        match guard.queue.front() {
            Some(front) if pred(front) => {
                let value = guard.queue.pop_front();
                drop(guard);
                self.not_full.notify_one();
                value
            }
            _ => None,
        }
    }

    /// Marks the channel closed. Already-buffered values may still be
    /// popped; no further pushes are accepted. Idempotent.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Marks the channel poisoned, discarding any buffered values. Idempotent.
    pub async fn poison(&self) {
        let mut inner = self.inner.lock().await;
        if inner.poisoned {
            return;
        }
        inner.poisoned = true;
        inner.queue.clear();
        drop(inner);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.closed || inner.poisoned
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order_preserved() {
        let chan = BoundedChannel::new(4);
        for i in 0..4 {
            assert!(chan.push(i).await);
        }
        for i in 0..4 {
            assert_eq!(chan.pop().await, Some(i));
        }
    }

    #[tokio::test]
    async fn push_blocks_until_space_then_succeeds() {
        let chan = BoundedChannel::new(1);
        assert!(chan.push(1).await);
        assert_eq!(chan.try_push(2), Err(TryError::WouldBlock));

        let chan2 = chan.clone();
        let handle = tokio::spawn(async move { chan2.push(2).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(chan.pop().await, Some(1));
        assert!(handle.await.unwrap());
        assert_eq!(chan.pop().await, Some(2));
    }

    #[tokio::test]
    async fn close_drains_then_returns_none() {
        let chan = BoundedChannel::new(4);
        assert!(chan.push(1).await);
        chan.close().await;
        assert!(!chan.push(2).await);
        assert_eq!(chan.pop().await, Some(1));
        assert_eq!(chan.pop().await, None);
    }

    #[tokio::test]
    async fn close_before_any_push_is_a_no_op() {
        let chan: Arc<BoundedChannel<u32>> = BoundedChannel::new(4);
        chan.close().await;
        chan.close().await;
        assert_eq!(chan.pop().await, None);
    }

    #[tokio::test]
    async fn poison_discards_buffered_values() {
        let chan = BoundedChannel::new(4);
        assert!(chan.push(1).await);
        chan.poison().await;
        assert_eq!(chan.pop().await, None);
        assert!(!chan.push(2).await);
    }

    #[tokio::test]
    async fn closing_wakes_a_blocked_popper() {
        let chan: Arc<BoundedChannel<u32>> = BoundedChannel::new(1);
        let chan2 = chan.clone();
        let popper = tokio::spawn(async move { chan2.pop().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        chan.close().await;
        assert_eq!(popper.await.unwrap(), None);
    }

    #[tokio::test]
    async fn try_pop_if_only_pops_matching_front() {
        let chan = BoundedChannel::new(4);
        chan.push(10).await;
        assert_eq!(chan.try_pop_if(|v| *v == 99), None);
        assert_eq!(chan.try_pop_if(|v| *v == 10), Some(10));
        assert_eq!(chan.try_pop_if(|_| true), None);
    }
}
