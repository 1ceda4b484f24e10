/// Result recorder: one flushed CSV line per request outcome.
use crate::engine::dispatcher::{Completion, Outcome};
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column order of the results log.
pub const HEADER: [&str; 5] = ["Timestamp", "Echo", "LatencyUS", "State", "EName"];

/// Final state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Done,
    PastDue,
    Error,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordStatus::Done => "done",
            RecordStatus::PastDue => "past_due",
            RecordStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One line of the results log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Replay-clock time of dispatch, in milliseconds
    #[serde(rename = "Timestamp")]
    pub scheduled_time_ms: f64,
    /// Decoded service output (done only)
    #[serde(rename = "Echo")]
    pub echoed_input: Option<String>,
    /// Request-local round trip in microseconds
    #[serde(rename = "LatencyUS")]
    pub measured_latency_us: Option<f64>,
    #[serde(rename = "State")]
    pub status: RecordStatus,
    /// Stable error classification (error only)
    #[serde(rename = "EName")]
    pub error_kind: Option<String>,
}

impl From<&Completion> for ResultRecord {
    fn from(completion: &Completion) -> Self {
        let (status, echoed_input, error_kind) = match &completion.outcome {
            Outcome::Done(echo) => (RecordStatus::Done, Some(echo.clone()), None),
            Outcome::PastDue => (RecordStatus::PastDue, None, None),
            Outcome::Failed(e) => (RecordStatus::Error, None, Some(e.kind().to_string())),
        };
        let measured_latency_us = match status {
            RecordStatus::Error => None,
            _ => completion.latency_us,
        };

        Self {
            scheduled_time_ms: completion.dispatched_at_ms,
            echoed_input,
            measured_latency_us,
            status,
            error_kind,
        }
    }
}

/// Running tally of recorded outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub done: usize,
    pub past_due: usize,
    pub error: usize,
}

impl RecordCounts {
    pub fn total(&self) -> usize {
        self.done + self.past_due + self.error
    }
}

/// Append-only writer for the results log.
///
/// The header is written on creation; every record is flushed right away
/// so a crashed run still leaves a usable log.
pub struct ResultRecorder<W: Write> {
    writer: csv::Writer<W>,
    counts: RecordCounts,
}

impl ResultRecorder<File> {
    /// Create (or truncate) a results file.
    pub fn create(path: &Path) -> Result<Self, AppError> {
        let file = File::create(path).map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to create output file {}: {}",
                path.display(),
                e
            )))
        })?;
        Self::new(file)
    }
}

impl<W: Write> ResultRecorder<W> {
    /// Wrap a writer and emit the header line.
    pub fn new(inner: W) -> Result<Self, AppError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(HEADER)?;
        writer.flush()?;

        Ok(Self {
            writer,
            counts: RecordCounts::default(),
        })
    }

    /// Append one record and flush it.
    pub fn record(&mut self, record: &ResultRecord) -> Result<(), AppError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;

        match record.status {
            RecordStatus::Done => self.counts.done += 1,
            RecordStatus::PastDue => self.counts.past_due += 1,
            RecordStatus::Error => self.counts.error += 1,
        }
        Ok(())
    }

    /// Outcomes recorded so far.
    pub fn counts(&self) -> RecordCounts {
        self.counts
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, AppError> {
        self.writer
            .into_inner()
            .map_err(|e| AppError::Io(std::io::Error::other(e.to_string())))
    }
}

/// Read a results log back.
pub fn read_records<R: std::io::Read>(reader: R) -> Result<Vec<ResultRecord>, AppError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for record in rdr.deserialize::<ResultRecord>() {
        records.push(record?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;

    fn completion(outcome: Outcome, latency_us: Option<f64>) -> Completion {
        Completion {
            job_id: 0,
            dispatched_at_ms: 12.5,
            latency_us,
            outcome,
        }
    }

    fn written(records: &[ResultRecord]) -> String {
        let mut recorder = ResultRecorder::new(Vec::new()).unwrap();
        for r in records {
            recorder.record(r).unwrap();
        }
        String::from_utf8(recorder.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn header_is_written_before_any_record() {
        assert_eq!(written(&[]), "Timestamp,Echo,LatencyUS,State,EName\n");
    }

    #[test]
    fn outcomes_map_to_fixed_columns() {
        let done = ResultRecord::from(&completion(Outcome::Done("5000".into()), Some(5100.0)));
        let past_due = ResultRecord::from(&completion(Outcome::PastDue, Some(3000.0)));
        let error = ResultRecord::from(&completion(
            Outcome::Failed(RequestError::Connect("refused".into())),
            Some(10.0),
        ));

        let out = written(&[done, past_due, error]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "12.5,5000,5100.0,done,");
        assert_eq!(lines[2], "12.5,,3000.0,past_due,");
        assert_eq!(lines[3], "12.5,,,error,openloop::RequestError::Connect");
    }

    #[test]
    fn text_echo_with_commas_is_quoted() {
        let record = ResultRecord::from(&completion(Outcome::Done("Bonjour, toi".into()), Some(1.0)));
        let out = written(&[record.clone()]);
        assert!(out.contains("\"Bonjour, toi\""));

        let back = read_records(out.as_bytes()).unwrap();
        assert_eq!(back, vec![record]);
    }

    #[test]
    fn counts_track_each_status() {
        let mut recorder = ResultRecorder::new(Vec::new()).unwrap();
        recorder
            .record(&ResultRecord::from(&completion(Outcome::PastDue, None)))
            .unwrap();
        recorder
            .record(&ResultRecord::from(&completion(
                Outcome::Failed(RequestError::Abandoned { waited_ms: 1 }),
                None,
            )))
            .unwrap();
        assert_eq!(
            recorder.counts(),
            RecordCounts {
                done: 0,
                past_due: 1,
                error: 1
            }
        );
        assert_eq!(recorder.counts().total(), 2);
    }
}
