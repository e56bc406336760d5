//! Bounded FIFO store of pre-generated keys.
//!
//! The queue itself is single-threaded; [`KeyPool`](crate::key_pool::KeyPool)
//! wraps it in a mutex so every push, pop and rotation is one critical
//! section. Entries are always removed from the head, so rotation and
//! consumers agree on what "oldest" means.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A queued value stamped with the moment it was produced.
#[derive(Debug)]
pub(crate) struct PooledEntry<T> {
    pub(crate) value: T,
    pub(crate) created_at: Instant,
}

impl<T> PooledEntry<T> {
    fn is_expired(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > max_age
    }
}

/// What a rotation pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rotation {
    pub(crate) over_capacity: usize,
    pub(crate) expired: usize,
}

impl Rotation {
    pub(crate) fn is_empty(&self) -> bool {
        self.over_capacity == 0 && self.expired == 0
    }
}

#[derive(Debug)]
pub(crate) struct KeyQueue<T> {
    entries: VecDeque<PooledEntry<T>>,
    capacity: usize,
    max_age: Duration,
}

impl<T> KeyQueue<T> {
    pub(crate) fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
            max_age,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Producers pause once the queue holds `capacity` entries.
    pub(crate) fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub(crate) fn push(&mut self, value: T, created_at: Instant) {
        self.entries.push_back(PooledEntry { value, created_at });
    }

    /// Evict from the head: first down to capacity, then every expired entry.
    pub(crate) fn rotate(&mut self, now: Instant) -> Rotation {
        let mut rotation = Rotation::default();

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            rotation.over_capacity += 1;
        }

        while self
            .entries
            .front()
            .is_some_and(|head| head.is_expired(now, self.max_age))
        {
            self.entries.pop_front();
            rotation.expired += 1;
        }

        rotation
    }

    /// Remove and return the oldest entry that is not past its max age.
    ///
    /// Expired heads are evicted on the way, so a consumer never receives a
    /// stale key even if no rotation pass has run since it aged out.
    pub(crate) fn pop_fresh(&mut self, now: Instant) -> (Option<T>, Rotation) {
        let rotation = self.rotate(now);
        let value = self.entries.pop_front().map(|entry| entry.value);
        (value, rotation)
    }
}
