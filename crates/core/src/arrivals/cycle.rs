//! The prefetch-then-apply cycle clock.
//!
//! `SyncCycle` is driven by frame deltas and never touches the network
//! itself: it says when to start a fetch and when to apply, and holds the
//! fetched snapshot in between.

use std::time::Duration;

/// What a single tick asks the driver to do.
///
/// Both fields can be set by the same tick when a frame straddles the
/// fetch point and the cycle end.
#[derive(Debug, PartialEq)]
pub struct TickOutcome<S> {
    /// Start a fetch tagged with this cycle number
    pub fetch: Option<u64>,
    /// The cycle completed; apply this snapshot (`None` if none arrived)
    pub apply: Option<Option<S>>,
}

impl<S> Default for TickOutcome<S> {
    fn default() -> Self {
        Self {
            fetch: None,
            apply: None,
        }
    }
}

#[derive(Debug)]
pub struct SyncCycle<S> {
    interval: Duration,
    fetch_point: Duration,
    elapsed: Duration,
    fetch_triggered: bool,
    pending: Option<S>,
    paused: bool,
    cycle: u64,
}

const DEFAULT_FETCH_AT: f64 = 0.5;

impl<S> SyncCycle<S> {
    /// `fetch_at` is the fraction of `interval` at which the fetch starts.
    /// It is clamped to `[0, 1]`; a non-finite value means half the cycle.
    pub fn new(interval: Duration, fetch_at: f64) -> Self {
        let fetch_at = if fetch_at.is_finite() {
            fetch_at.clamp(0.0, 1.0)
        } else {
            DEFAULT_FETCH_AT
        };

        Self {
            interval,
            fetch_point: interval.mul_f64(fetch_at),
            elapsed: Duration::ZERO,
            fetch_triggered: false,
            pending: None,
            paused: false,
            cycle: 0,
        }
    }

    pub fn tick(&mut self, delta: Duration) -> TickOutcome<S> {
        let mut outcome = TickOutcome::default();
        if self.paused {
            return outcome;
        }

        self.elapsed += delta;

        if !self.fetch_triggered && self.elapsed >= self.fetch_point {
            self.fetch_triggered = true;
            outcome.fetch = Some(self.cycle);
        }

        if self.elapsed >= self.interval {
            outcome.apply = Some(self.pending.take());
            self.elapsed = Duration::ZERO;
            self.fetch_triggered = false;
            self.cycle += 1;
        }

        outcome
    }

    /// Hold a fetched snapshot until the cycle ends.
    ///
    /// Rejected (returns false) when `cycle` is not the current cycle or a
    /// snapshot is already pending.
    pub fn store(&mut self, cycle: u64, snapshot: S) -> bool {
        if cycle != self.cycle || !self.fetch_triggered || self.pending.is_some() {
            return false;
        }
        self.pending = Some(snapshot);
        true
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Completed fraction of the current cycle, in `0.0..=1.0`
    pub fn progress(&self) -> f64 {
        if self.interval.is_zero() {
            return 0.0;
        }
        (self.elapsed.as_secs_f64() / self.interval.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Number of completed cycles
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
