/// Trace loader: parses a CSV workload into time-ordered job batches.
use crate::error::TraceError;
use crate::payload::Payload;
use crate::trace::types::{Batch, Job};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::iter::Peekable;
use std::path::Path;
use std::time::Duration;

/// Column names used to read a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceColumns {
    /// Column holding the arrival time in milliseconds
    pub time: String,
    /// Column holding the job payload
    pub payload: String,
}

impl Default for TraceColumns {
    fn default() -> Self {
        Self {
            time: "Admitted".to_string(),
            payload: "Length".to_string(),
        }
    }
}

/// Reads trace files into a [`Schedule`].
#[derive(Debug, Clone, Default)]
pub struct TraceLoader {
    columns: TraceColumns,
}

impl TraceLoader {
    /// Create a loader reading the given columns.
    pub fn new(columns: TraceColumns) -> Self {
        Self { columns }
    }

    /// Load a trace from a CSV file on disk.
    pub fn load_path<P: Payload>(&self, path: &Path) -> Result<Schedule<P>, TraceError> {
        let file = File::open(path)?;
        self.load_reader(file)
    }

    /// Load a trace from any CSV source.
    ///
    /// Every row is parsed up front so a malformed trace fails before
    /// replay starts; batches are then coalesced lazily.
    pub fn load_reader<P: Payload, R: Read>(&self, reader: R) -> Result<Schedule<P>, TraceError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let column_index = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| TraceError::MissingColumn {
                    column: name.to_string(),
                })
        };
        let time_idx = column_index(&self.columns.time)?;
        let payload_idx = column_index(&self.columns.payload)?;

        let mut jobs = Vec::new();
        for (id, record) in rdr.records().enumerate() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let raw_time = record.get(time_idx).unwrap_or_default();
            let arrival_offset_ms = parse_arrival(raw_time).map_err(|reason| {
                TraceError::InvalidValue {
                    line,
                    column: self.columns.time.clone(),
                    value: raw_time.to_string(),
                    reason,
                }
            })?;

            let raw_payload = record.get(payload_idx).unwrap_or_default();
            let payload = P::parse(raw_payload).map_err(|reason| TraceError::InvalidValue {
                line,
                column: self.columns.payload.clone(),
                value: raw_payload.to_string(),
                reason,
            })?;

            jobs.push(Job {
                id,
                arrival_offset_ms,
                payload,
            });
        }

        Ok(Schedule::from_jobs(jobs))
    }
}

fn parse_arrival(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("not a number: {}", e))?;
    if !value.is_finite() {
        return Err("not a finite number".to_string());
    }
    if value < 0.0 {
        return Err("arrival time before replay start".to_string());
    }
    if Duration::try_from_secs_f64(value / 1000.0).is_err() {
        return Err("arrival time too large to schedule".to_string());
    }
    Ok(value)
}

/// Time-ordered sequence of `(batch, delay_ms)` pairs.
///
/// `delay_ms` is the gap between this batch's arrival offset and the
/// previous batch's (the first is measured from time zero), so every pair,
/// the last one included, carries its own well-defined delay.
#[derive(Debug)]
pub struct Schedule<P> {
    jobs: Peekable<std::vec::IntoIter<Job<P>>>,
    previous_offset_ms: f64,
    job_count: usize,
}

impl<P> Schedule<P> {
    /// Build a schedule from jobs in arbitrary order.
    pub fn from_jobs(mut jobs: Vec<Job<P>>) -> Self {
        // stable: jobs sharing a timestamp keep trace input order
        jobs.sort_by(|a, b| a.arrival_offset_ms.total_cmp(&b.arrival_offset_ms));
        Self {
            job_count: jobs.len(),
            jobs: jobs.into_iter().peekable(),
            previous_offset_ms: 0.0,
        }
    }

    /// Build a schedule from `(arrival_ms, payload)` rows, numbering jobs in input order.
    pub fn from_rows(rows: impl IntoIterator<Item = (f64, P)>) -> Self {
        let jobs = rows
            .into_iter()
            .enumerate()
            .map(|(id, (arrival_offset_ms, payload))| Job {
                id,
                arrival_offset_ms,
                payload,
            })
            .collect();
        Self::from_jobs(jobs)
    }

    /// Total number of jobs in the trace.
    pub fn job_count(&self) -> usize {
        self.job_count
    }
}

impl<P> Iterator for Schedule<P> {
    type Item = (Batch<P>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.jobs.next()?;
        let offset = first.arrival_offset_ms;

        let mut jobs = vec![first];
        while let Some(job) = self.jobs.next_if(|j| j.arrival_offset_ms == offset) {
            jobs.push(job);
        }

        let delay_ms = offset - self.previous_offset_ms;
        self.previous_offset_ms = offset;

        Some((
            Batch {
                arrival_offset_ms: offset,
                jobs,
            },
            delay_ms,
        ))
    }
}
