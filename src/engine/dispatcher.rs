/// Request dispatcher: fires one concurrent request per job without waiting.
use crate::engine::clock::ReplayClock;
use crate::error::RequestError;
use crate::http::client::Predictor;
use crate::payload::Payload;
use crate::trace::Batch;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::debug;

/// How a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The service answered; holds the decoded echo
    Done(String),
    /// The service explicitly declined to answer
    PastDue,
    /// The request failed before or during completion
    Failed(RequestError),
}

/// What the request task hands back when it resolves.
#[derive(Debug)]
pub struct Resolution {
    pub outcome: Outcome,
    pub resolved_at: Instant,
}

/// A resolved (or abandoned) request, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Job ID from the trace
    pub job_id: usize,
    /// Replay-clock time of dispatch, in milliseconds
    pub dispatched_at_ms: f64,
    /// Request-local round trip in microseconds; `None` when abandoned
    pub latency_us: Option<f64>,
    pub outcome: Outcome,
}

/// A request that has been started but not yet observed resolved.
#[derive(Debug)]
pub struct InFlightRequest {
    pub job_id: usize,
    pub dispatched_at: Instant,
    pub dispatched_at_ms: f64,
    handle: JoinHandle<Resolution>,
}

impl InFlightRequest {
    /// Whether the request task has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the request task and turn its result into a completion.
    pub async fn complete(self) -> Completion {
        let joined = self.handle.await;
        Self::completion(self.job_id, self.dispatched_at, self.dispatched_at_ms, joined)
    }

    /// Wait for the request task until `deadline`; abort and abandon it past that.
    pub async fn complete_by(mut self, deadline: Instant, waited_ms: u64) -> Completion {
        match tokio::time::timeout_at(deadline, &mut self.handle).await {
            Ok(joined) => {
                Self::completion(self.job_id, self.dispatched_at, self.dispatched_at_ms, joined)
            }
            Err(_) => self.abandon(waited_ms),
        }
    }

    /// Stop waiting for the request and record it as abandoned.
    pub fn abandon(self, waited_ms: u64) -> Completion {
        self.handle.abort();
        Completion {
            job_id: self.job_id,
            dispatched_at_ms: self.dispatched_at_ms,
            latency_us: None,
            outcome: Outcome::Failed(RequestError::Abandoned { waited_ms }),
        }
    }

    fn completion(
        job_id: usize,
        dispatched_at: Instant,
        dispatched_at_ms: f64,
        joined: Result<Resolution, JoinError>,
    ) -> Completion {
        match joined {
            Ok(resolution) => Completion {
                job_id,
                dispatched_at_ms,
                latency_us: Some(
                    resolution
                        .resolved_at
                        .saturating_duration_since(dispatched_at)
                        .as_secs_f64()
                        * 1_000_000.0,
                ),
                outcome: resolution.outcome,
            },
            Err(e) => Completion {
                job_id,
                dispatched_at_ms,
                latency_us: None,
                outcome: Outcome::Failed(RequestError::Panicked(e.to_string())),
            },
        }
    }
}

/// Every outstanding request, keyed by job ID.
#[derive(Debug, Default)]
pub struct InFlightSet {
    requests: BTreeMap<usize, InFlightRequest>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Track newly dispatched requests.
    pub fn extend(&mut self, requests: impl IntoIterator<Item = InFlightRequest>) {
        for request in requests {
            self.requests.insert(request.job_id, request);
        }
    }

    /// Remove and return every request whose task has already finished.
    pub fn take_finished(&mut self) -> Vec<InFlightRequest> {
        let finished: Vec<usize> = self
            .requests
            .iter()
            .filter(|(_, r)| r.is_finished())
            .map(|(id, _)| *id)
            .collect();

        finished
            .into_iter()
            .filter_map(|id| self.requests.remove(&id))
            .collect()
    }

    /// Remove and return every request, in job ID order.
    pub fn take_all(&mut self) -> Vec<InFlightRequest> {
        std::mem::take(&mut self.requests).into_values().collect()
    }
}

/// Starts requests against the prediction service.
pub struct RequestDispatcher<C: ?Sized, P> {
    client: Arc<C>,
    clock: ReplayClock,
    _payload: PhantomData<fn(P)>,
}

impl<C, P> RequestDispatcher<C, P>
where
    C: Predictor + ?Sized + 'static,
    P: Payload,
{
    /// Create a dispatcher sharing `client` across all requests.
    pub fn new(client: Arc<C>, clock: ReplayClock) -> Self {
        Self {
            client,
            clock,
            _payload: PhantomData,
        }
    }

    /// Start one request per job and return immediately.
    ///
    /// Must be called from within a tokio runtime. Jobs are started in
    /// batch order; nothing here waits on the network.
    pub fn dispatch(&self, batch: Batch<P>) -> Vec<InFlightRequest> {
        batch
            .jobs
            .into_iter()
            .map(|job| {
                let dispatched_at = Instant::now();
                let dispatched_at_ms = self.clock.elapsed_since_start(dispatched_at);
                debug!(
                    job = job.id,
                    "at {:.3} ms fetching {}",
                    dispatched_at_ms,
                    job.payload.describe()
                );

                let client = Arc::clone(&self.client);
                let input = job.payload.encode();
                let handle = tokio::spawn(async move {
                    let result = client.predict(input).await;
                    let resolved_at = Instant::now();
                    let outcome = match result {
                        Ok(Some(output)) => match P::decode(&output) {
                            Ok(echo) => Outcome::Done(echo),
                            Err(e) => Outcome::Failed(e),
                        },
                        Ok(None) => Outcome::PastDue,
                        Err(e) => Outcome::Failed(e),
                    };
                    Resolution {
                        outcome,
                        resolved_at,
                    }
                });

                InFlightRequest {
                    job_id: job.id,
                    dispatched_at,
                    dispatched_at_ms,
                    handle,
                }
            })
            .collect()
    }
}
