// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Background reclamation of expired entries.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tick::{Clock, PeriodicTimer};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{ErrorKind, Result};
use crate::population::Population;
use crate::runtime::Runtime;
use crate::store::StoreInner;
use crate::telemetry::{SessionActivity, SessionOperation, Telemetry};

/// What caused a sweep to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SweepTrigger {
    /// The periodic timer fired.
    Timer,
    /// The population grew past the hysteresis threshold.
    Growth,
    /// A caller invoked `SessionStore::sweep` directly.
    Manual,
}

impl SweepTrigger {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Growth => "growth",
            Self::Manual => "manual",
        }
    }
}

/// State shared between a running reclaimer task and its handle.
#[derive(Debug)]
struct ReclaimerState {
    shutdown: Notify,
    sweeps: AtomicU64,
    running: AtomicBool,
}

/// Per-store record of the reclaimer, if one was started.
#[derive(Debug, Default)]
pub(crate) struct ReclaimerSlot {
    state: Mutex<Option<Arc<ReclaimerState>>>,
}

impl ReclaimerSlot {
    /// Tells a running reclaimer that its store is gone.
    pub(crate) fn store_dropped(&mut self) {
        if let Some(state) = self.state.get_mut().take() {
            state.shutdown.notify_one();
        }
    }
}

/// Handle to a store's background reclaimer.
///
/// Dropping the handle detaches the task; it keeps sweeping until the store itself is
/// dropped. Use [`shutdown`](Self::shutdown) and [`join`](Self::join) to stop it explicitly.
pub struct Reclaimer {
    state: Arc<ReclaimerState>,
    task: JoinHandle<()>,
}

impl Reclaimer {
    /// Returns how many sweeps the reclaimer has completed.
    #[must_use]
    pub fn completed_sweeps(&self) -> u64 {
        self.state.sweeps.load(Ordering::Acquire)
    }

    /// Returns `true` until the reclaimer task has exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Asks the reclaimer to stop after the sweep in progress, if any.
    pub fn shutdown(&self) {
        self.state.shutdown.notify_one();
    }

    /// Waits for the reclaimer task to exit.
    ///
    /// Call [`shutdown`](Self::shutdown) first unless the store is being dropped, otherwise
    /// this waits indefinitely.
    ///
    /// # Panics
    ///
    /// Resumes the panic if the reclaimer task panicked.
    pub async fn join(self) {
        if let Err(error) = self.task.await
            && error.is_panic()
        {
            std::panic::resume_unwind(error.into_panic());
        }
    }
}

impl fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reclaimer")
            .field("completed_sweeps", &self.completed_sweeps())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

pub(crate) fn spawn(inner: &Arc<StoreInner>, runtime: &Runtime) -> Result<Reclaimer> {
    let state = {
        let mut slot = inner.reclaimer.state.lock();
        if slot.is_some() {
            return Err(ErrorKind::ReclamationStarted.into());
        }

        let state = Arc::new(ReclaimerState {
            shutdown: Notify::new(),
            sweeps: AtomicU64::new(0),
            running: AtomicBool::new(true),
        });
        *slot = Some(Arc::clone(&state));
        state
    };

    let task = runtime.spawn(run(
        Arc::downgrade(inner),
        Arc::clone(&inner.population),
        Arc::clone(&state),
        inner.clock.clone(),
        inner.sweep_interval(),
        inner.telemetry.clone(),
    ));

    Ok(Reclaimer { state, task })
}

async fn run(
    store: Weak<StoreInner>,
    population: Arc<Population>,
    state: Arc<ReclaimerState>,
    clock: Clock,
    interval: Duration,
    telemetry: Telemetry,
) {
    telemetry.record(SessionOperation::Reclaim, SessionActivity::Started);

    let mut timer = PeriodicTimer::new(&clock, interval);

    loop {
        let trigger = tokio::select! {
            biased;
            () = state.shutdown.notified() => break,
            () = population.sweep_requested() => SweepTrigger::Growth,
            Some(()) = timer.next() => SweepTrigger::Timer,
        };

        // Only a weak reference is held between sweeps so the store can be dropped.
        let Some(inner) = store.upgrade() else {
            break;
        };
        let report = inner.sweep();
        drop(inner);

        state.sweeps.fetch_add(1, Ordering::AcqRel);
        telemetry.record_sweep(trigger, &report);
    }

    state.running.store(false, Ordering::Release);
    telemetry.record(SessionOperation::Reclaim, SessionActivity::Stopped);
}

#[cfg(test)]
mod tests {
    use tick::ClockControl;

    use super::*;
    use crate::SessionStore;
    use crate::testing::LogCapture;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(condition(), "condition not reached in time");
    }

    #[test]
    fn trigger_names() {
        assert_eq!(SweepTrigger::Timer.as_str(), "timer");
        assert_eq!(SweepTrigger::Growth.as_str(), "growth");
        assert_eq!(SweepTrigger::Manual.as_str(), "manual");
    }

    #[tokio::test]
    async fn growth_wakes_reclaimer_before_timer() {
        let control = ClockControl::new();
        let store = SessionStore::builder(control.to_clock())
            .ttl(Duration::from_secs(3600))
            .logs(false)
            .build();

        let reclaimer = store.start_reclamation().expect("reclamation should start");
        store.put("first", 1_u8).expect("put should succeed");

        // The clock never moves, so only the growth trigger can cause this sweep.
        wait_until(|| reclaimer.completed_sweeps() >= 1).await;
        assert_eq!(store.population(), 1);

        reclaimer.shutdown();
        reclaimer.join().await;
    }

    #[tokio::test]
    async fn reclaimer_logs_lifecycle() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let store = SessionStore::new(Clock::new_frozen());
        let reclaimer = store.start_reclamation().expect("reclamation should start");

        // Current-thread runtime: the task only runs while this test awaits.
        tokio::task::yield_now().await;
        reclaimer.shutdown();
        reclaimer.join().await;

        capture.assert_contains(SessionActivity::Started.as_str());
        capture.assert_contains(SessionActivity::Stopped.as_str());
    }

    #[tokio::test]
    async fn store_drop_stops_reclaimer() {
        let store = SessionStore::new(Clock::new_frozen());
        let reclaimer = store.start_reclamation().expect("reclamation should start");

        drop(store);

        reclaimer.join().await;
    }

    #[test]
    fn slot_drop_without_reclaimer_is_noop() {
        let mut slot = ReclaimerSlot::default();
        slot.store_dropped();
        assert!(slot.state.lock().is_none());
    }
}
