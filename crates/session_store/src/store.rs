// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The concurrent session store.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use foldhash::fast::RandomState;
use tick::Clock;

use crate::builder::SessionStoreBuilder;
use crate::entry::{Entry, EntryPool, SharedValue};
use crate::error::{Error, ErrorKind, Result};
use crate::population::Population;
use crate::reclaimer::{self, Reclaimer, ReclaimerSlot, SweepTrigger};
use crate::runtime::Runtime;
use crate::telemetry::{SessionActivity, SessionOperation, Telemetry};

type EntryMap = DashMap<Box<[u8]>, Box<Entry>, RandomState>;

/// Outcome of one full reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries inspected during the pass.
    pub visited: usize,
    /// Expired entries removed by the pass.
    pub evicted: usize,
    /// Live population right after the pass. This becomes the new growth baseline.
    pub remaining: usize,
}

/// A concurrent, typed, in-process key-value store with sliding expiration.
///
/// Keys are arbitrary byte sequences. Each `put`, `get` and `delete` call chooses the value
/// type; a lookup with the wrong type fails with [`ErrorKind::TypeMismatch`] instead of
/// returning the value.
///
/// Every entry expires once more than the store's TTL has passed since it was last
/// written or successfully read. Expired entries are removed lazily when touched and in
/// bulk by [`sweep`](Self::sweep), which a background task can run for you (see
/// [`start_reclamation`](Self::start_reclamation)).
///
/// Cloning is cheap and every clone refers to the same store.
///
/// # Concurrency
///
/// Entries are spread across independently locked shards, so callers operating on
/// different keys rarely contend. Operations on one key are linearizable. A sweep walks
/// the shards one at a time and never blocks the whole store; entries inserted while it
/// runs may or may not be visited.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use session_store::SessionStore;
/// use tick::Clock;
///
/// let store = SessionStore::new(Clock::new_frozen());
/// store.set_ttl(Duration::from_secs(60));
///
/// store.put("token", 42_u64)?;
/// assert_eq!(*store.get::<u64>("token")?, 42);
///
/// // Live entries are never overwritten.
/// assert!(store.put("token", 7_u64).unwrap_err().is_already_exists());
///
/// // The value type is checked on every access.
/// assert!(store.get::<String>("token").unwrap_err().is_type_mismatch());
///
/// assert_eq!(*store.delete::<u64>("token")?, 42);
/// assert!(store.get::<u64>("token").unwrap_err().is_not_found());
/// # Ok::<(), session_store::Error>(())
/// ```
#[derive(Clone)]
pub struct SessionStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl SessionStore {
    /// Creates a store with default settings, using `clock` as its time source.
    ///
    /// Reclamation is not started; call [`start_reclamation`](Self::start_reclamation) for that.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self::builder(clock).build()
    }

    /// Creates a builder for configuring a store.
    #[must_use]
    pub fn builder(clock: Clock) -> SessionStoreBuilder {
        SessionStoreBuilder::new(clock)
    }

    pub(crate) fn from_inner(inner: StoreInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// Sets the expiration window shared by all entries.
    ///
    /// The TTL is kept at millisecond precision. Configure it before the store is used;
    /// entries already stored are judged against the new value from then on.
    pub fn set_ttl(&self, ttl: Duration) {
        self.inner.set_ttl(ttl);
    }

    /// Returns the expiration window shared by all entries.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl()
    }

    /// Inserts `value` under `key`.
    ///
    /// An expired entry under the same key is evicted and replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::AlreadyExists`] if a live entry is stored under `key`. The store
    /// is left unchanged.
    pub fn put<T>(&self, key: impl AsRef<[u8]>, value: T) -> Result<()>
    where
        T: Any + Send + Sync,
    {
        self.inner.insert(key.as_ref(), Arc::new(value))
    }

    /// Returns the value stored under `key` and restarts its expiration window.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::NotFound`] if no entry exists.
    /// - [`ErrorKind::Expired`] if the entry had aged out, whatever its type. The entry is
    ///   evicted, so the next lookup reports `NotFound`.
    /// - [`ErrorKind::TypeMismatch`] if the live value is not a `T`. The entry is neither
    ///   refreshed nor removed.
    pub fn get<T>(&self, key: impl AsRef<[u8]>) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = self.inner.access(key.as_ref(), |value| (**value).is::<T>())?;
        downcast(value)
    }

    /// Removes the entry under `key`, whether or not it has expired, and returns its value.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::NotFound`] if no entry exists.
    /// - [`ErrorKind::TypeMismatch`] if the stored value is not a `T`. The entry stays in place.
    pub fn delete<T>(&self, key: impl AsRef<[u8]>) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = self.inner.remove(key.as_ref(), |value| (**value).is::<T>())?;
        downcast(value)
    }

    /// Returns `true` if a live entry is stored under `key`.
    ///
    /// Unlike [`get`](Self::get), this neither refreshes nor evicts the entry.
    #[must_use]
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        let now = self.inner.clock.instant();
        let ttl = self.inner.ttl();
        self.inner
            .map
            .get(key.as_ref())
            .is_some_and(|entry| !entry.is_expired(now, ttl))
    }

    /// Runs one full reclamation pass, evicting every expired entry.
    ///
    /// The post-sweep population becomes the baseline for the growth trigger.
    pub fn sweep(&self) -> SweepReport {
        let report = self.inner.sweep();
        self.inner.telemetry.record_sweep(SweepTrigger::Manual, &report);
        report
    }

    /// Removes every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.inner.clear()
    }

    /// Starts the background reclaimer on the current Tokio runtime.
    ///
    /// The reclaimer sweeps the store periodically and whenever the population has grown
    /// by half since the previous sweep. It runs until [`Reclaimer::shutdown`] is called or
    /// every handle to the store has been dropped.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::RuntimeUnavailable`] if called outside of a Tokio runtime.
    /// - [`ErrorKind::ReclamationStarted`] if reclamation was already started for this store.
    pub fn start_reclamation(&self) -> Result<Reclaimer> {
        let runtime = Runtime::current().ok_or(ErrorKind::RuntimeUnavailable)?;
        reclaimer::spawn(&self.inner, &runtime)
    }

    /// Starts the background reclaimer on the runtime behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ReclamationStarted`] if reclamation was already started for this store.
    pub fn start_reclamation_on(&self, handle: &tokio::runtime::Handle) -> Result<Reclaimer> {
        reclaimer::spawn(&self.inner, &Runtime::from_handle(handle.clone()))
    }

    /// Returns the number of entries currently stored, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.map.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.map.is_empty()
    }

    /// Returns the live-entry count maintained for the growth trigger.
    #[must_use]
    pub fn population(&self) -> usize {
        self.inner.population.count()
    }

    /// Returns the name used to tag log events.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.telemetry.name()
    }

    /// Returns the clock used to time entry accesses.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    #[cfg(test)]
    pub(crate) fn pooled_entries(&self) -> usize {
        self.inner.pool.len()
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("name", &self.name())
            .field("ttl", &self.ttl())
            .field("len", &self.len())
            .field("population", &self.population())
            .finish_non_exhaustive()
    }
}

fn downcast<T>(value: SharedValue) -> Result<Arc<T>>
where
    T: Any + Send + Sync,
{
    value
        .downcast::<T>()
        .map_err(|_mismatched| Error::from(ErrorKind::TypeMismatch))
}

/// Shared state behind every [`SessionStore`] handle.
pub(crate) struct StoreInner {
    pub(crate) map: EntryMap,
    pub(crate) pool: EntryPool,
    pub(crate) population: Arc<Population>,
    pub(crate) clock: Clock,
    pub(crate) telemetry: Telemetry,
    pub(crate) reclaimer: ReclaimerSlot,
    ttl_millis: AtomicU64,
    sweep_interval: Option<Duration>,
}

impl StoreInner {
    pub(crate) fn new(
        map: EntryMap,
        pool: EntryPool,
        clock: Clock,
        telemetry: Telemetry,
        ttl: Duration,
        sweep_interval: Option<Duration>,
    ) -> Self {
        Self {
            map,
            pool,
            population: Arc::new(Population::new()),
            clock,
            telemetry,
            reclaimer: ReclaimerSlot::default(),
            ttl_millis: AtomicU64::new(as_millis(ttl)),
            sweep_interval,
        }
    }

    pub(crate) fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis.load(Ordering::Acquire))
    }

    fn set_ttl(&self, ttl: Duration) {
        self.ttl_millis.store(as_millis(ttl), Ordering::Release);
    }

    /// The reclaimer's timer period: the configured interval, or 1.25 × TTL.
    pub(crate) fn sweep_interval(&self) -> Duration {
        self.sweep_interval.unwrap_or_else(|| {
            let ttl = self.ttl();
            ttl.checked_mul(5).map_or(Duration::MAX, |scaled| scaled / 4)
        })
    }

    pub(crate) fn insert(&self, key: &[u8], value: SharedValue) -> Result<()> {
        let now = self.clock.instant();
        let ttl = self.ttl();

        let stale = match self.map.entry(Box::from(key)) {
            MapEntry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now, ttl) {
                    self.telemetry.record(SessionOperation::Put, SessionActivity::Rejected);
                    return Err(ErrorKind::AlreadyExists.into());
                }

                let stale = occupied.insert(self.pool.acquire(now, value));
                self.population.decrease();
                self.population.increase();
                Some(stale)
            }
            MapEntry::Vacant(vacant) => {
                // Count while the shard is still locked so a racing delete cannot decrement first.
                let _published = vacant.insert(self.pool.acquire(now, value));
                self.population.increase();
                None
            }
        };

        // Retired outside the shard lock so the old value is never dropped under it.
        if let Some(stale) = stale {
            drop(self.pool.release(stale));
            self.telemetry.record(SessionOperation::Put, SessionActivity::Replaced);
        } else {
            self.telemetry.record(SessionOperation::Put, SessionActivity::Inserted);
        }

        Ok(())
    }

    pub(crate) fn access(&self, key: &[u8], accepts: impl FnOnce(&SharedValue) -> bool) -> Result<SharedValue> {
        let now = self.clock.instant();
        let ttl = self.ttl();

        {
            let Some(mut entry) = self.map.get_mut(key) else {
                self.telemetry.record(SessionOperation::Get, SessionActivity::Miss);
                return Err(ErrorKind::NotFound.into());
            };

            if !entry.is_expired(now, ttl) {
                let Some(value) = entry.payload().filter(|value| accepts(value)).map(Arc::clone) else {
                    drop(entry);
                    self.telemetry.record(SessionOperation::Get, SessionActivity::Mismatch);
                    return Err(ErrorKind::TypeMismatch.into());
                };

                entry.touch(now);
                drop(entry);
                self.telemetry.record(SessionOperation::Get, SessionActivity::Hit);
                return Ok(value);
            }
        }

        // The shard guard must be gone before removing from the same shard.
        self.evict_expired(key, now, ttl);
        self.telemetry.record(SessionOperation::Get, SessionActivity::Expired);
        Err(ErrorKind::Expired.into())
    }

    pub(crate) fn remove(&self, key: &[u8], accepts: impl FnOnce(&SharedValue) -> bool) -> Result<SharedValue> {
        let removed = self.map.remove_if(key, |_, entry| entry.payload().is_some_and(accepts));

        match removed {
            Some((_, entry)) => {
                self.population.decrease();
                self.telemetry.record(SessionOperation::Delete, SessionActivity::Removed);
                self.pool.release(entry).ok_or_else(|| ErrorKind::TypeMismatch.into())
            }
            None if self.map.contains_key(key) => {
                self.telemetry.record(SessionOperation::Delete, SessionActivity::Mismatch);
                Err(ErrorKind::TypeMismatch.into())
            }
            None => {
                self.telemetry.record(SessionOperation::Delete, SessionActivity::Miss);
                Err(ErrorKind::NotFound.into())
            }
        }
    }

    /// Removes `key` if its entry is still expired as of `now`.
    ///
    /// An entry refreshed or replaced in the meantime is left alone.
    fn evict_expired(&self, key: &[u8], now: Instant, ttl: Duration) -> bool {
        match self.map.remove_if(key, |_, entry| entry.is_expired(now, ttl)) {
            Some((_, entry)) => {
                self.population.decrease();
                drop(self.pool.release(entry));
                true
            }
            None => false,
        }
    }

    pub(crate) fn sweep(&self) -> SweepReport {
        let now = self.clock.instant();
        let ttl = self.ttl();

        // Collect first: removing while a shard is being iterated would deadlock on its lock.
        let mut visited = 0;
        let mut expired = Vec::new();
        for entry in &self.map {
            visited += 1;
            if entry.value().is_expired(now, ttl) {
                expired.push(entry.key().clone());
            }
        }

        let evicted = expired.iter().filter(|key| self.evict_expired(key, now, ttl)).count();

        self.population.mark_swept();

        SweepReport {
            visited,
            evicted,
            remaining: self.population.count(),
        }
    }

    fn clear(&self) -> usize {
        let keys: Vec<Box<[u8]>> = self.map.iter().map(|entry| entry.key().clone()).collect();

        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.map.remove(&*key) {
                self.population.decrease();
                drop(self.pool.release(entry));
                removed += 1;
            }
        }

        self.telemetry.record_clear(removed);
        removed
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.reclaimer.store_dropped();
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
