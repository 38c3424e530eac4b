//! Bounded in-memory ring buffer for power samples.
//!
//! This is the single synchronization point between the background poller
//! (producer) and the foreground exporter / rate estimator (consumers).
//!
//! # Design
//!
//! - Arena-style fixed storage: a `Vec` allocated once at capacity, with a
//!   write cursor and index wraparound. Overflow overwrites the oldest
//!   sample — old data is dropped, the producer is never blocked.
//! - A single `Mutex` guards the storage. It is held only for the duration
//!   of an append or a copy, never across I/O, so a slow sink cannot stall
//!   polling and a slow remote cannot stall export.
//! - Consumers read via `snapshot()` (full copy, oldest first) or
//!   `latest()` (copy of the newest sample); iteration always happens on
//!   the copy, outside the lock.

use std::sync::{Mutex, PoisonError};

use crate::sample::Sample;

/// Default ring capacity: the most recent 1000 samples.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Fixed-capacity, thread-safe ring of the most recent samples.
///
/// Shared between the poller and exporter via `Arc<SampleRing>`.
#[derive(Debug)]
pub struct SampleRing {
    inner: Mutex<RingInner>,
    capacity: usize,
}

#[derive(Debug)]
struct RingInner {
    /// Fixed-size slot arena; slots past `len` are unwritten.
    slots: Vec<Option<Sample>>,
    /// Next slot to write.
    cursor: usize,
    /// Number of valid samples, saturating at capacity.
    len: usize,
}

impl SampleRing {
    /// Creates a ring with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            inner: Mutex::new(RingInner {
                slots: (0..capacity).map(|_| None).collect(),
                cursor: 0,
                len: 0,
            }),
            capacity,
        }
    }

    /// Appends a sample, overwriting the oldest when the ring is full.
    pub fn push(&self, sample: Sample) {
        let mut inner = self.lock();
        let cursor = inner.cursor;
        inner.slots[cursor] = Some(sample);
        inner.cursor = (cursor + 1) % self.capacity;
        inner.len = (inner.len + 1).min(self.capacity);
    }

    /// Returns a copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        let inner = self.lock();
        let mut out = Vec::with_capacity(inner.len);
        // Oldest sample sits at the cursor once the ring has wrapped,
        // otherwise at slot 0.
        let start = if inner.len == self.capacity {
            inner.cursor
        } else {
            0
        };
        for i in 0..inner.len {
            let slot = (start + i) % self.capacity;
            if let Some(sample) = &inner.slots[slot] {
                out.push(sample.clone());
            }
        }
        out
    }

    /// Returns a copy of the most recent sample, or `None` if empty.
    pub fn latest(&self) -> Option<Sample> {
        let inner = self.lock();
        if inner.len == 0 {
            return None;
        }
        let newest = (inner.cursor + self.capacity - 1) % self.capacity;
        inner.slots[newest].clone()
    }

    /// Returns the number of buffered samples.
    pub fn len(&self) -> usize {
        self.lock().len
    }

    /// Returns whether the ring holds no samples yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Locks the inner state, recovering from poisoning.
    ///
    /// Nothing that runs under this lock can panic, so a poisoned mutex
    /// only means some other thread died mid-append; the slot data is
    /// still a valid `Option<Sample>` either way.
    fn lock(&self) -> std::sync::MutexGuard<'_, RingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
