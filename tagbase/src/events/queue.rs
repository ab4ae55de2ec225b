//! Per-session notification queue
//!
//! Producers are writer threads evaluating events under a tag lock; the
//! single consumer is the owning session. The queue lock is always taken
//! after any tag lock and never the other way around.

use super::{EventCallback, Notification};
use crate::types::EventId;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A queued notification and the callback to run when it is drained
pub(crate) struct Pending {
    pub notification: Notification,
    pub callback: Option<EventCallback>,
}

/// Bounded FIFO of pending notifications with a blocking wait
pub struct NotificationQueue {
    pending: Mutex<VecDeque<Pending>>,
    ready: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a notification, discarding the oldest one when full
    pub(crate) fn push(&self, entry: Pending) {
        let mut pending = self.pending.lock();
        if pending.len() >= self.capacity {
            if let Some(old) = pending.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Notification queue full ({}), dropped event {} on {}",
                    self.capacity,
                    old.notification.id,
                    old.notification.tag_name
                );
            }
        }
        pending.push_back(entry);
        self.ready.notify_one();
    }

    /// Take the oldest notification without blocking
    pub(crate) fn pop(&self) -> Option<Pending> {
        self.pending.lock().pop_front()
    }

    /// Take the oldest notification, blocking until one arrives or
    /// `timeout` elapses
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub(crate) fn wait_for(&self, timeout: Duration) -> Option<Pending> {
        let deadline = Instant::now().checked_add(timeout);
        let mut pending = self.pending.lock();
        while pending.is_empty() {
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut pending, deadline).timed_out() {
                        break;
                    }
                }
                None => self.ready.wait(&mut pending),
            }
        }
        pending.pop_front()
    }

    /// Remove every queued notification of a registration
    pub(crate) fn purge(&self, id: EventId) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|p| p.notification.id != id);
        before - pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Notifications discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
