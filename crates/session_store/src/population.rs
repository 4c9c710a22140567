// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Live-entry accounting and the hysteresis trigger that wakes the reclaimer early.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Tracks how many entries are live and how many were live after the last sweep.
///
/// A sweep is requested once the population has grown by half since the previous one.
/// The request is a single-permit notification: extra requests made while one is already
/// pending collapse into it, and no caller ever waits for the reclaimer.
#[derive(Debug, Default)]
pub(crate) struct Population {
    count: AtomicUsize,
    baseline: AtomicUsize,
    wake: Notify,
}

impl Population {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Counts one more live entry, requesting a sweep if the growth threshold is reached.
    pub(crate) fn increase(&self) {
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if Self::grown_enough(count, self.baseline.load(Ordering::Acquire)) {
            self.wake.notify_one();
        }
    }

    /// Counts one fewer live entry.
    pub(crate) fn decrease(&self) {
        // Saturate rather than wrap if removals ever outpace the matching inserts.
        let _ = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| Some(count.saturating_sub(1)));
    }

    /// Resets the hysteresis baseline to the current population.
    pub(crate) fn mark_swept(&self) {
        self.baseline.store(self.count.load(Ordering::Acquire), Ordering::Release);
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn baseline(&self) -> usize {
        self.baseline.load(Ordering::Acquire)
    }

    /// Completes once a sweep has been requested, consuming the request.
    pub(crate) async fn sweep_requested(&self) {
        self.wake.notified().await;
    }

    // count >= baseline * 1.5
    fn grown_enough(count: usize, baseline: usize) -> bool {
        count.saturating_mul(2) >= baseline.saturating_mul(3)
    }
}
