/// Data structures for a loaded workload trace.
use std::fmt;

/// A single job read from the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Job<P> {
    /// Job ID (zero-based data row index in the trace)
    pub id: usize,
    /// Scheduled arrival, in milliseconds from replay start
    pub arrival_offset_ms: f64,
    /// Opaque payload relayed to the prediction service
    pub payload: P,
}

/// Jobs sharing one scheduled arrival offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<P> {
    /// Arrival offset shared by every job in the batch
    pub arrival_offset_ms: f64,
    /// Jobs in trace input order
    pub jobs: Vec<Job<P>>,
}

impl<P> Batch<P> {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl<P> fmt::Display for Batch<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Batch {{ offset: {:.3} ms, jobs.len: {} }}",
            self.arrival_offset_ms,
            self.jobs.len()
        )
    }
}
