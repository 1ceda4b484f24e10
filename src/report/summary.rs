/// Offline latency and outcome statistics over a results log.
use crate::engine::recorder::{RecordStatus, ResultRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// Latency statistics of answered requests, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub average: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

/// Aggregated view of one replay run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSummary {
    pub total: usize,
    pub done: usize,
    pub past_due: usize,
    pub errors: usize,
    /// Share of jobs answered, in percent
    pub done_rate: f64,
    /// Dispatch span from first to last record, in milliseconds
    pub span_ms: f64,
    /// Latency of `done` requests; `None` if nothing was answered
    pub latency_ms: Option<LatencyStats>,
    /// Error classifications and how often each occurred
    pub error_kinds: BTreeMap<String, usize>,
}

impl ResultSummary {
    /// Summarize a set of records.
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let mut summary = ResultSummary {
            total: records.len(),
            ..Default::default()
        };

        let mut latencies_ms = Vec::new();
        for record in records {
            match record.status {
                RecordStatus::Done => {
                    summary.done += 1;
                    if let Some(us) = record.measured_latency_us {
                        latencies_ms.push(us / 1000.0);
                    }
                }
                RecordStatus::PastDue => summary.past_due += 1,
                RecordStatus::Error => {
                    summary.errors += 1;
                    let kind = record
                        .error_kind
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string());
                    *summary.error_kinds.entry(kind).or_insert(0) += 1;
                }
            }
        }

        if summary.total > 0 {
            summary.done_rate = (summary.done as f64 / summary.total as f64) * 100.0;
            let (first, last) = records.iter().fold((f64::MAX, f64::MIN), |(lo, hi), r| {
                (lo.min(r.scheduled_time_ms), hi.max(r.scheduled_time_ms))
            });
            summary.span_ms = last - first;
        }

        summary.latency_ms = latency_stats(latencies_ms);
        summary
    }
}

fn latency_stats(mut latencies: Vec<f64>) -> Option<LatencyStats> {
    if latencies.is_empty() {
        return None;
    }
    latencies.sort_by(|a, b| a.total_cmp(b));

    let average = latencies.iter().sum::<f64>() / latencies.len() as f64;
    Some(LatencyStats {
        average,
        p50: percentile(&latencies, 0.50),
        p95: percentile(&latencies, 0.95),
        p99: percentile(&latencies, 0.99),
        max: latencies[latencies.len() - 1],
    })
}

/// Nearest-rank percentile of sorted, non-empty data.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: f64, status: RecordStatus, latency_us: Option<f64>, kind: Option<&str>) -> ResultRecord {
        ResultRecord {
            scheduled_time_ms: ts,
            echoed_input: None,
            measured_latency_us: latency_us,
            status,
            error_kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn counts_states_and_error_kinds() {
        let records = vec![
            record(0.0, RecordStatus::Done, Some(2000.0), None),
            record(0.0, RecordStatus::PastDue, Some(9000.0), None),
            record(10.0, RecordStatus::Error, None, Some("openloop::RequestError::Connect")),
            record(20.0, RecordStatus::Error, None, Some("openloop::RequestError::Connect")),
            record(30.0, RecordStatus::Error, None, Some("openloop::RequestError::Abandoned")),
        ];

        let summary = ResultSummary::from_records(&records);

        assert_eq!(summary.total, 5);
        assert_eq!(summary.done, 1);
        assert_eq!(summary.past_due, 1);
        assert_eq!(summary.errors, 3);
        assert_eq!(summary.done_rate, 20.0);
        assert_eq!(summary.span_ms, 30.0);
        assert_eq!(summary.error_kinds["openloop::RequestError::Connect"], 2);
        assert_eq!(summary.error_kinds["openloop::RequestError::Abandoned"], 1);

        let latency = summary.latency_ms.expect("one answered request");
        assert_eq!(latency.p50, 2.0);
        assert_eq!(latency.max, 2.0);
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let records: Vec<_> = (1..=100)
            .map(|i| record(i as f64, RecordStatus::Done, Some(i as f64 * 1000.0), None))
            .collect();

        let latency = ResultSummary::from_records(&records)
            .latency_ms
            .expect("latencies present");

        assert_eq!(latency.p50, 50.0);
        assert_eq!(latency.p95, 95.0);
        assert_eq!(latency.p99, 99.0);
        assert_eq!(latency.max, 100.0);
        assert!((latency.average - 50.5).abs() < 1e-9);
    }

    #[test]
    fn empty_log_has_no_latency() {
        let summary = ResultSummary::from_records(&[]);
        assert_eq!(summary, ResultSummary::default());
    }
}
