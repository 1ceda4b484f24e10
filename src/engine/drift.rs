/// Drift monitor: flags batches whose dispatch slipped off the schedule.
use tracing::warn;

/// What the replay loop should do with the time left before a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacingDecision {
    /// Budget remains; sleep until the scheduled offset
    Sleep,
    /// Already at or slightly past the offset; dispatch right away
    OnTime,
    /// Bookkeeping overran the budget beyond tolerance; sleep skipped
    Overrun { behind_ms: f64 },
}

/// Compares actual elapsed time with the schedule.
///
/// Advisory only: warnings are logged and counted, never raised.
#[derive(Debug, Clone)]
pub struct DriftMonitor {
    tolerance_ms: f64,
    warnings: usize,
}

impl DriftMonitor {
    pub fn new(tolerance_ms: f64) -> Self {
        Self {
            tolerance_ms,
            warnings: 0,
        }
    }

    /// Decide how to pace a batch given the budget left after bookkeeping.
    pub fn before_sleep(&mut self, batch: usize, remaining_ms: f64) -> PacingDecision {
        if remaining_ms > 0.0 {
            return PacingDecision::Sleep;
        }
        if -remaining_ms > self.tolerance_ms {
            self.warnings += 1;
            warn!(batch, "bookkeeping for too long: {:.3} ms", remaining_ms);
            return PacingDecision::Overrun {
                behind_ms: -remaining_ms,
            };
        }
        PacingDecision::OnTime
    }

    /// Check how far past the scheduled offset the sleep actually returned.
    ///
    /// Returns `true` when the drift exceeded tolerance.
    pub fn after_sleep(&mut self, batch: usize, drift_ms: f64) -> bool {
        if drift_ms > self.tolerance_ms {
            self.warnings += 1;
            warn!(batch, "slept for too long: {:.3} ms", -drift_ms);
            return true;
        }
        false
    }

    /// Number of drift warnings emitted so far.
    pub fn warnings(&self) -> usize {
        self.warnings
    }
}
