// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cycle scheduling with cooperative shutdown.

use crate::checkpoint::CheckpointStore;
use crate::cycle::{CycleReport, Loader};
use crate::error::Result;
use crate::source::ObservationSource;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cancellation signal shared between the scheduler and signal handlers.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake any waiter.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`. Returns true if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut triggered = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            triggered = cvar
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *triggered
    }
}

/// Totals across cycles.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub rows_seen: u64,
    pub points_written: u64,
    pub rows_discarded: u64,
    pub partial_errors: u64,
}

impl SchedulerStats {
    fn record(&mut self, reports: &[CycleReport]) {
        self.cycles += 1;
        for r in reports {
            self.rows_seen += r.rows as u64;
            self.points_written += r.kept as u64;
            self.rows_discarded += r.discarded as u64;
            self.partial_errors += r.partial_errors as u64;
        }
    }
}

/// Runs loader cycles until shutdown or the first error.
pub struct Scheduler<S, C> {
    loader: Loader<S, C>,
    interval: Duration,
    max_idle_interval: Duration,
    shutdown: ShutdownHandle,
    stats: SchedulerStats,
}

impl<S: ObservationSource, C: CheckpointStore> Scheduler<S, C> {
    /// Scheduler sleeping `interval` between cycles, without idle backoff.
    pub fn new(loader: Loader<S, C>, interval: Duration) -> Self {
        Self {
            loader,
            interval,
            max_idle_interval: interval,
            shutdown: ShutdownHandle::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Double the delay after each consecutive empty cycle, up to `max`.
    pub fn with_max_idle_interval(mut self, max: Duration) -> Self {
        self.max_idle_interval = max.max(self.interval);
        self
    }

    /// Handle that stops [`Scheduler::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn loader(&self) -> &Loader<S, C> {
        &self.loader
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Run a single cycle.
    pub fn run_once(&mut self) -> Result<Vec<CycleReport>> {
        let reports = self.loader.run_cycle()?;
        self.stats.record(&reports);
        Ok(reports)
    }

    /// Loop until shutdown is triggered. A cycle error ends the loop.
    pub fn run(&mut self) -> Result<SchedulerStats> {
        let mut idle_streak = 0u32;

        while !self.shutdown.is_triggered() {
            let reports = self.run_once()?;

            if reports.iter().all(CycleReport::is_empty) {
                idle_streak = idle_streak.saturating_add(1);
            } else {
                idle_streak = 0;
            }

            let delay = backoff_delay(self.interval, self.max_idle_interval, idle_streak);
            if self.shutdown.wait_timeout(delay) {
                break;
            }
        }

        tracing::info!(
            "Scheduler stopped after {} cycles ({} rows, {} points, {} discarded)",
            self.stats.cycles,
            self.stats.rows_seen,
            self.stats.points_written,
            self.stats.rows_discarded
        );
        Ok(self.stats.clone())
    }
}

/// Delay after `idle_streak` consecutive empty cycles: `interval` for the
/// first, doubling afterwards, capped at `max`.
fn backoff_delay(interval: Duration, max: Duration, idle_streak: u32) -> Duration {
    if idle_streak <= 1 {
        return interval;
    }
    let factor = 1u32.checked_shl(idle_streak - 1).unwrap_or(u32::MAX);
    interval.checked_mul(factor).unwrap_or(max).min(max).max(interval)
}
