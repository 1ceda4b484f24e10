/// Open-loop replay: paces batches on the trace schedule, never on responses.
use crate::config::ReplayConfig;
use crate::engine::clock::ReplayClock;
use crate::engine::dispatcher::{Completion, InFlightSet, Outcome, RequestDispatcher};
use crate::engine::drift::{DriftMonitor, PacingDecision};
use crate::engine::reaper::{drain_all, drain_nonblocking};
use crate::engine::recorder::{ResultRecord, ResultRecorder};
use crate::error::{AppError, RequestError};
use crate::http::client::Predictor;
use crate::payload::Payload;
use crate::trace::Schedule;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPhase {
    Init,
    Replaying,
    Draining,
    Done,
}

impl fmt::Display for ReplayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplayPhase::Init => "init",
            ReplayPhase::Replaying => "replaying",
            ReplayPhase::Draining => "draining",
            ReplayPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Batches dispatched
    pub batches: usize,
    /// Requests started
    pub dispatched: usize,
    pub done: usize,
    pub past_due: usize,
    /// Error records, abandoned requests included
    pub errors: usize,
    /// Requests still pending when draining gave up
    pub abandoned: usize,
    pub drift_warnings: usize,
    /// Replay-clock time when the run finished
    pub elapsed_ms: f64,
}

impl RunSummary {
    /// Number of records written.
    pub fn recorded(&self) -> usize {
        self.done + self.past_due + self.errors
    }

    fn tally(&mut self, completion: &Completion) {
        match &completion.outcome {
            Outcome::Done(_) => self.done += 1,
            Outcome::PastDue => self.past_due += 1,
            Outcome::Failed(e) => {
                self.errors += 1;
                if matches!(e, RequestError::Abandoned { .. }) {
                    self.abandoned += 1;
                }
            }
        }
    }
}

/// Sleep until `target_ms` unless bookkeeping already overran it.
///
/// Never sleeps a negative duration: an overrun beyond tolerance skips the
/// sleep and is reported by the drift monitor instead.
async fn pace(
    clock: &ReplayClock,
    drift: &mut DriftMonitor,
    batch: usize,
    target_ms: f64,
) -> PacingDecision {
    let decision = drift.before_sleep(batch, target_ms - clock.now());
    if decision == PacingDecision::Sleep {
        clock.sleep_until(target_ms).await;
        drift.after_sleep(batch, clock.now() - target_ms);
    }
    decision
}

/// Replays a schedule against one prediction endpoint.
pub struct Replayer<C: ?Sized> {
    client: Arc<C>,
    drift_tolerance_ms: f64,
    drain_timeout: Duration,
    strict: bool,
    phase: ReplayPhase,
    #[cfg(feature = "progress")]
    progress: Option<Arc<indicatif::ProgressBar>>,
}

impl<C> Replayer<C>
where
    C: Predictor + ?Sized + 'static,
{
    /// Create a replayer sharing `client` across every request.
    pub fn new(client: Arc<C>, config: &ReplayConfig) -> Self {
        Self {
            client,
            drift_tolerance_ms: config.drift_tolerance_ms,
            drain_timeout: config.drain_timeout(),
            strict: config.strict,
            phase: ReplayPhase::Init,
            #[cfg(feature = "progress")]
            progress: None,
        }
    }

    /// Advance a progress bar by each batch's job count as it is dispatched.
    #[cfg(feature = "progress")]
    pub fn with_progress(mut self, progress: Arc<indicatif::ProgressBar>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ReplayPhase {
        self.phase
    }

    fn transition(&mut self, next: ReplayPhase) {
        debug!(from = %self.phase, to = %next, "replay phase");
        self.phase = next;
    }

    /// Replay every batch, drain outstanding requests and record all outcomes.
    ///
    /// Each batch is dispatched at or after its scheduled offset and never
    /// waits on earlier responses. Every dispatched job gets exactly one
    /// record, including requests abandoned when draining times out.
    ///
    /// # Errors
    ///
    /// Recorder I/O failures abort the run. In strict mode the first
    /// per-request error aborts it as `AppError::Request`, after the
    /// remaining in-flight requests have been recorded as abandoned.
    pub async fn run<P, W>(
        &mut self,
        schedule: Schedule<P>,
        recorder: &mut ResultRecorder<W>,
    ) -> Result<RunSummary, AppError>
    where
        P: Payload,
        W: Write,
    {
        self.transition(ReplayPhase::Replaying);
        let total_jobs = schedule.job_count();

        let clock = ReplayClock::start();
        let dispatcher = RequestDispatcher::<C, P>::new(Arc::clone(&self.client), clock);
        let mut drift = DriftMonitor::new(self.drift_tolerance_ms);
        let mut inflight = InFlightSet::new();
        let mut summary = RunSummary::default();

        info!(jobs = total_jobs, endpoint = self.client.endpoint(), "rock and roll");

        for (index, (batch, delay_ms)) in schedule.enumerate() {
            let target_ms = batch.arrival_offset_ms;

            // spare time before the batch is due: harvest what already finished
            if clock.now() < target_ms && !inflight.is_empty() {
                let reaped = drain_nonblocking(&mut inflight).await;
                if let Some(failure) = self.settle(&reaped, recorder, &mut summary)? {
                    return self.abort(failure, &mut inflight, recorder, summary, &drift, &clock);
                }
            }

            pace(&clock, &mut drift, index, target_ms).await;

            info!(
                batch = index,
                jobs = batch.len(),
                "at {:.3} ms batch delay {:.3} ms",
                clock.now(),
                delay_ms
            );
            let started = dispatcher.dispatch(batch);
            let count = started.len();
            summary.batches += 1;
            summary.dispatched += count;
            inflight.extend(started);
            // let the new requests hit the wire before the next bookkeeping pass
            tokio::task::yield_now().await;

            #[cfg(feature = "progress")]
            if let Some(pb) = &self.progress {
                pb.inc(count as u64);
            }
        }

        self.transition(ReplayPhase::Draining);
        info!(pending = inflight.len(), "trace exhausted, draining");
        let drained = drain_all(&mut inflight, self.drain_timeout).await;
        let failure = self.settle(&drained, recorder, &mut summary)?;

        self.transition(ReplayPhase::Done);
        summary.drift_warnings = drift.warnings();
        summary.elapsed_ms = clock.now();

        #[cfg(feature = "progress")]
        if let Some(pb) = &self.progress {
            pb.finish_with_message("replay completed");
        }

        if let Some((job, source)) = failure {
            return Err(AppError::Request { job, source });
        }

        let counts = recorder.counts();
        info!(
            recorded = counts.total(),
            done = counts.done,
            past_due = counts.past_due,
            errors = counts.error,
            abandoned = summary.abandoned,
            drift_warnings = summary.drift_warnings,
            "done"
        );
        Ok(summary)
    }

    /// Record completions; in strict mode report the first failure.
    fn settle<W: Write>(
        &self,
        completions: &[Completion],
        recorder: &mut ResultRecorder<W>,
        summary: &mut RunSummary,
    ) -> Result<Option<(usize, RequestError)>, AppError> {
        let mut first_failure = None;
        for completion in completions {
            recorder.record(&ResultRecord::from(completion))?;
            summary.tally(completion);

            if let Outcome::Failed(e) = &completion.outcome {
                warn!(job = completion.job_id, kind = e.kind(), "request failed: {}", e);
                if self.strict && first_failure.is_none() {
                    first_failure = Some((completion.job_id, e.clone()));
                }
            }
        }
        Ok(first_failure)
    }

    /// Strict-mode abort: abandon what is still in flight, record it, fail.
    fn abort<W: Write>(
        &mut self,
        (job, source): (usize, RequestError),
        inflight: &mut InFlightSet,
        recorder: &mut ResultRecorder<W>,
        mut summary: RunSummary,
        drift: &DriftMonitor,
        clock: &ReplayClock,
    ) -> Result<RunSummary, AppError> {
        warn!(job, pending = inflight.len(), "strict mode: aborting replay");
        let abandoned: Vec<Completion> = inflight
            .take_all()
            .into_iter()
            .map(|request| request.abandon(0))
            .collect();
        for completion in &abandoned {
            recorder.record(&ResultRecord::from(completion))?;
            summary.tally(completion);
        }
        summary.drift_warnings = drift.warnings();
        summary.elapsed_ms = clock.now();
        self.transition(ReplayPhase::Done);
        debug!(?summary, "aborted run");

        Err(AppError::Request { job, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::recorder::{read_records, RecordStatus};
    use crate::payload::NumericPayload;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Scripted backend keyed on the numeric input:
    /// `< 0` fails, `0` answers "no answer", otherwise sleeps that many ms.
    struct ScriptedBackend {
        start: Instant,
        calls: Mutex<Vec<(f64, f64)>>,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// `(input, call time in ms)` pairs in call order.
        fn calls(&self) -> Vec<(f64, f64)> {
            self.calls.lock().expect("calls mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl Predictor for ScriptedBackend {
        async fn predict(&self, input: Value) -> Result<Option<Value>, RequestError> {
            let ms = input[0].as_f64().unwrap_or(0.0);
            let at = self.start.elapsed().as_secs_f64() * 1000.0;
            self.calls.lock().expect("calls mutex poisoned").push((ms, at));

            if ms < 0.0 {
                return Err(RequestError::Connect("connection refused".into()));
            }
            if ms == 0.0 {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
            Ok(Some(Value::from(ms)))
        }

        fn endpoint(&self) -> &str {
            "mock://scripted"
        }
    }

    fn config() -> ReplayConfig {
        ReplayConfig {
            endpoint: "mock://scripted".into(),
            drain_timeout_ms: 5_000,
            ..ReplayConfig::default()
        }
    }

    async fn replay(
        config: &ReplayConfig,
        rows: Vec<(f64, f64)>,
    ) -> (
        Arc<ScriptedBackend>,
        Result<RunSummary, AppError>,
        Vec<ResultRecord>,
    ) {
        let backend = Arc::new(ScriptedBackend::new());
        let mut replayer = Replayer::new(Arc::clone(&backend), config);
        let schedule = Schedule::from_rows(rows.into_iter().map(|(t, l)| (t, NumericPayload(l))));
        let mut recorder = ResultRecorder::new(Vec::new()).unwrap();

        let result = replayer.run(schedule, &mut recorder).await;
        assert_eq!(replayer.phase(), ReplayPhase::Done);

        let bytes = recorder.into_inner().unwrap();
        let records = read_records(bytes.as_slice()).unwrap();
        (backend, result, records)
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_bookkeeping_skips_sleep_and_warns() {
        let clock = ReplayClock::start();
        let mut drift = DriftMonitor::new(5.0);

        // bookkeeping ate 20 ms of a 10 ms budget
        tokio::time::advance(Duration::from_millis(20)).await;
        let decision = pace(&clock, &mut drift, 0, 10.0).await;

        assert_eq!(decision, PacingDecision::Overrun { behind_ms: 10.0 });
        assert_eq!(drift.warnings(), 1);
        assert!((clock.now() - 20.0).abs() < 1e-6, "no sleep must happen");
    }

    #[tokio::test(start_paused = true)]
    async fn pace_sleeps_the_remaining_budget() {
        let clock = ReplayClock::start();
        let mut drift = DriftMonitor::new(5.0);

        tokio::time::advance(Duration::from_millis(3)).await;
        let decision = pace(&clock, &mut drift, 0, 10.0).await;

        assert_eq!(decision, PacingDecision::Sleep);
        assert_eq!(drift.warnings(), 0);
        assert!((clock.now() - 10.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn every_job_gets_exactly_one_record() {
        let rows = vec![(0.0, 5.0), (0.0, 8.0), (10.0, 0.0), (20.0, -1.0), (30.0, 3.0)];
        let (_, result, records) = replay(&config(), rows).await;
        let summary = result.expect("run succeeds");

        assert_eq!(summary.batches, 4);
        assert_eq!(summary.dispatched, 5);
        assert_eq!(summary.recorded(), 5);
        assert_eq!(records.len(), 5);
        assert_eq!(summary.done, 3);
        assert_eq!(summary.past_due, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.abandoned, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_does_not_delay_later_dispatches() {
        // job at 0 ms takes 10 s; the rest must still go out on schedule
        let rows = vec![(0.0, 10_000.0), (10.0, 1.0), (20.0, 1.0), (30.0, 1.0)];
        let (backend, result, _) = replay(&config(), rows).await;
        result.expect("run succeeds");

        let dispatch_times: Vec<f64> = backend.calls().iter().map(|(_, at)| *at).collect();
        assert_eq!(dispatch_times.len(), 4);
        for (actual, scheduled) in dispatch_times.iter().zip([0.0, 10.0, 20.0, 30.0]) {
            assert!(
                (actual - scheduled).abs() < 1.0,
                "dispatched at {} ms, scheduled {} ms",
                actual,
                scheduled
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_answer_is_past_due_not_error() {
        let (_, result, records) = replay(&config(), vec![(0.0, 0.0)]).await;
        let summary = result.expect("past due is not an error");

        assert_eq!(summary.past_due, 1);
        assert_eq!(records[0].status, RecordStatus::PastDue);
        assert!(records[0].error_kind.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn connection_error_is_recorded_and_replay_continues() {
        let rows = vec![(0.0, -1.0), (10.0, 2.0)];
        let (backend, result, records) = replay(&config(), rows).await;
        result.expect("errors are isolated by default");

        assert_eq!(backend.calls().len(), 2);
        let error = records
            .iter()
            .find(|r| r.status == RecordStatus::Error)
            .expect("error record");
        assert_eq!(
            error.error_kind.as_deref(),
            Some("openloop::RequestError::Connect")
        );
        assert!(records.iter().any(|r| r.status == RecordStatus::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_requests_are_abandoned_after_grace() {
        let config = ReplayConfig {
            drain_timeout_ms: 100,
            ..config()
        };
        let rows = vec![(0.0, 1.0), (5.0, 3_600_000.0)];
        let (_, result, records) = replay(&config, rows).await;
        let summary = result.expect("abandoning is not fatal");

        assert_eq!(summary.abandoned, 1);
        assert_eq!(records.len(), 2);
        let abandoned = records
            .iter()
            .find(|r| r.status == RecordStatus::Error)
            .expect("abandoned record");
        assert_eq!(
            abandoned.error_kind.as_deref(),
            Some("openloop::RequestError::Abandoned")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn strict_mode_aborts_on_first_error() {
        let config = ReplayConfig {
            strict: true,
            ..config()
        };
        // job 0 fails as soon as it runs and is harvested before the 10 ms
        // batch, so neither later batch goes out
        let rows = vec![(0.0, -1.0), (0.0, 50_000.0), (10.0, 1.0), (1_000.0, 7.0)];
        let (backend, result, records) = replay(&config, rows).await;

        match result {
            Err(AppError::Request { job, source }) => {
                assert_eq!(job, 0);
                assert_eq!(source.kind(), "openloop::RequestError::Connect");
            }
            other => panic!("expected strict abort, got {:?}", other),
        }
        let inputs: Vec<f64> = backend.calls().iter().map(|(input, _)| *input).collect();
        assert_eq!(inputs, vec![-1.0, 50_000.0]);
        // the failed job plus the one still in flight, each recorded once
        assert_eq!(records.len(), 2);
        assert_eq!(
            records
                .iter()
                .filter(|r| r.error_kind.as_deref() == Some("openloop::RequestError::Abandoned"))
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_schedule_finishes_cleanly() {
        let (_, result, records) = replay(&config(), Vec::new()).await;
        let summary = result.unwrap();
        assert_eq!(summary, RunSummary::default());
        assert!(records.is_empty());
    }
}
