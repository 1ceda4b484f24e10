/// Completion reaper: harvests finished requests without stalling the schedule.
use crate::engine::dispatcher::{Completion, InFlightSet, Outcome};
use crate::error::RequestError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Poll the in-flight set with zero wait.
///
/// Already-resolved requests are removed from `inflight` and returned; the
/// rest stay pending. Never waits on an unfinished request.
pub async fn drain_nonblocking(inflight: &mut InFlightSet) -> Vec<Completion> {
    let finished = inflight.take_finished();
    let mut completions = Vec::with_capacity(finished.len());
    for request in finished {
        completions.push(request.complete().await);
    }
    if !completions.is_empty() {
        debug!(
            reaped = completions.len(),
            pending = inflight.len(),
            "bookkeeping"
        );
    }
    completions
}

/// Wait for every outstanding request, bounded by one shared grace period.
///
/// Requests still pending when the grace period runs out are aborted and
/// returned as abandoned completions, so every dispatched job is accounted for.
pub async fn drain_all(inflight: &mut InFlightSet, grace: Duration) -> Vec<Completion> {
    let deadline = Instant::now() + grace;
    let waited_ms = grace.as_millis() as u64;

    let mut completions = Vec::with_capacity(inflight.len());
    for request in inflight.take_all() {
        completions.push(request.complete_by(deadline, waited_ms).await);
    }

    let abandoned = completions
        .iter()
        .filter(|c| matches!(c.outcome, Outcome::Failed(RequestError::Abandoned { .. })))
        .count();
    if abandoned > 0 {
        warn!(abandoned, grace_ms = waited_ms, "requests abandoned after draining");
    }
    completions
}
