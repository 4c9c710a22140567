// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring session stores.

use std::borrow::Cow;
use std::num::NonZero;
use std::time::Duration;

use dashmap::DashMap;
use foldhash::fast::RandomState;
use tick::Clock;

use crate::entry::EntryPool;
use crate::store::{SessionStore, StoreInner};
use crate::telemetry::Telemetry;

const DEFAULT_TTL: Duration = Duration::from_secs(600);
const DEFAULT_POOL_CAPACITY: usize = 1024;
const DEFAULT_NAME: &str = "session_store";

/// Builder for configuring a [`SessionStore`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use session_store::SessionStore;
/// use tick::Clock;
///
/// let store = SessionStore::builder(Clock::new_frozen())
///     .ttl(Duration::from_secs(300))
///     .initial_capacity(1_000)
///     .name("web-sessions")
///     .build();
///
/// assert_eq!(store.ttl(), Duration::from_secs(300));
/// assert_eq!(store.name(), "web-sessions");
/// ```
#[derive(Debug)]
pub struct SessionStoreBuilder {
    clock: Clock,
    ttl: Duration,
    initial_capacity: usize,
    shard_amount: Option<usize>,
    pool_capacity: usize,
    sweep_interval: Option<Duration>,
    name: Cow<'static, str>,
    logs: bool,
}

impl SessionStoreBuilder {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            ttl: DEFAULT_TTL,
            initial_capacity: 0,
            shard_amount: None,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            sweep_interval: None,
            name: Cow::Borrowed(DEFAULT_NAME),
            logs: true,
        }
    }

    /// Sets the expiration window. Defaults to 10 minutes.
    ///
    /// An entry expires once more than this much time has passed since it was last
    /// written or read.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Pre-allocates room for `capacity` entries.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the number of independently locked shards.
    ///
    /// The value is rounded up to a power of two, with a minimum of 2. Defaults to four
    /// shards per available CPU.
    #[must_use]
    pub fn shard_amount(mut self, shards: usize) -> Self {
        self.shard_amount = Some(shards);
        self
    }

    /// Caps how many retired entry allocations are kept for reuse. Defaults to 1024.
    ///
    /// Zero disables pooling.
    #[must_use]
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Sets the reclaimer's timer period.
    ///
    /// By default the reclaimer wakes every 1.25 × TTL, using the TTL in effect when
    /// reclamation starts. Growth-triggered sweeps happen regardless of this period.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Sets the name attached to log events. Defaults to `session_store`.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables or disables log events. Enabled by default.
    #[must_use]
    pub fn logs(mut self, enabled: bool) -> Self {
        self.logs = enabled;
        self
    }

    /// Builds the configured store.
    #[must_use]
    pub fn build(self) -> SessionStore {
        let shards = shard_amount(self.shard_amount);
        let map = DashMap::with_capacity_and_hasher_and_shard_amount(self.initial_capacity, RandomState::default(), shards);

        SessionStore::from_inner(StoreInner::new(
            map,
            EntryPool::new(self.pool_capacity),
            self.clock,
            Telemetry::new(self.name, self.logs),
            self.ttl,
            self.sweep_interval,
        ))
    }
}

fn shard_amount(requested: Option<usize>) -> usize {
    requested
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZero::get).saturating_mul(4))
        .max(2)
        .next_power_of_two()
}
