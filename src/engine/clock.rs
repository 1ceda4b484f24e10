/// Replay clock: elapsed time since replay start and schedule-relative sleeps.
use std::time::Duration;
use tokio::time::Instant;

const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Monotonic reference captured once when replay starts.
///
/// All offsets are milliseconds relative to `start`; the reference is never
/// reset during a run.
#[derive(Debug, Clone, Copy)]
pub struct ReplayClock {
    start: Instant,
}

impl ReplayClock {
    /// Start the clock now.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds since replay start.
    pub fn now(&self) -> f64 {
        self.elapsed_since_start(Instant::now())
    }

    /// Elapsed milliseconds between replay start and `at`.
    pub fn elapsed_since_start(&self, at: Instant) -> f64 {
        at.saturating_duration_since(self.start).as_secs_f64() * 1000.0
    }

    /// Instant corresponding to an offset from replay start.
    ///
    /// Offsets beyond what `Instant` can represent saturate to a point
    /// about 30 years after the start.
    pub fn instant_at(&self, offset_ms: f64) -> Instant {
        Duration::try_from_secs_f64(offset_ms.max(0.0) / 1000.0)
            .ok()
            .and_then(|offset| self.start.checked_add(offset))
            .unwrap_or_else(|| self.start + FAR_FUTURE)
    }

    /// Suspend the calling task until `target_ms` has elapsed.
    ///
    /// The remaining budget is computed at call time, so time already spent
    /// on bookkeeping is accounted for. Returns immediately when the target
    /// is already past.
    pub async fn sleep_until(&self, target_ms: f64) {
        let deadline = self.instant_at(target_ms);
        if deadline > Instant::now() {
            tokio::time::sleep_until(deadline).await;
        }
    }
}
