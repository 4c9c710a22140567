// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stored entries and the free-list that recycles their allocations.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A type-erased value held by the store.
///
/// Values are shared rather than copied: reads hand out another reference to the same
/// allocation.
pub type SharedValue = Arc<dyn Any + Send + Sync>;

/// The unit stored per key: last access time plus the opaque value.
pub(crate) struct Entry {
    last_access: Instant,
    // `None` only while the allocation sits in the pool.
    value: Option<SharedValue>,
}

impl Entry {
    /// Returns `true` once more than `ttl` has passed since the last access.
    pub(crate) fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_access) > ttl
    }

    /// Slides the expiration window forward.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }

    pub(crate) fn payload(&self) -> Option<&SharedValue> {
        self.value.as_ref()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("last_access", &self.last_access)
            .field("occupied", &self.value.is_some())
            .finish()
    }
}

/// A bounded free-list of retired entries.
///
/// Entries leave the pool fully initialized: [`EntryPool::acquire`] writes both the
/// access time and the value before the entry is handed out, so nothing half-built can
/// become visible in the store.
pub(crate) struct EntryPool {
    free: Mutex<Vec<Box<Entry>>>,
    capacity: usize,
}

impl EntryPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Hands out an initialized entry, reusing a retired allocation when one is available.
    pub(crate) fn acquire(&self, now: Instant, value: SharedValue) -> Box<Entry> {
        let recycled = self.free.lock().pop();
        match recycled {
            Some(mut entry) => {
                entry.last_access = now;
                entry.value = Some(value);
                entry
            }
            None => Box::new(Entry {
                last_access: now,
                value: Some(value),
            }),
        }
    }

    /// Retires an entry, returning the value it held.
    ///
    /// The allocation is kept for reuse unless the pool is already full.
    pub(crate) fn release(&self, mut entry: Box<Entry>) -> Option<SharedValue> {
        let value = entry.value.take();

        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(entry);
        }

        value
    }

    /// Number of retired allocations waiting for reuse.
    pub(crate) fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for EntryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPool")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
