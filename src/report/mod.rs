/// Offline analysis of replay results.
pub mod summary;

pub use summary::{LatencyStats, ResultSummary};

use crate::error::AppError;
use clap::ValueEnum;

/// Output formats for result summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable text
    Text,
    /// JSON
    Json,
    /// Single CSV row with header
    Csv,
}

/// Render a summary in the requested format.
pub fn render(summary: &ResultSummary, format: ReportFormat) -> Result<String, AppError> {
    let mut out = String::new();
    match format {
        ReportFormat::Text => {
            let pct = |n: usize| {
                if summary.total > 0 {
                    n as f64 / summary.total as f64 * 100.0
                } else {
                    0.0
                }
            };
            out.push_str("=== Replay Results ===\n");
            out.push_str(&format!("Total Jobs: {}\n", summary.total));
            out.push_str(&format!("Done: {} ({:.1}%)\n", summary.done, pct(summary.done)));
            out.push_str(&format!(
                "Past due: {} ({:.1}%)\n",
                summary.past_due,
                pct(summary.past_due)
            ));
            out.push_str(&format!("Errors: {} ({:.1}%)\n", summary.errors, pct(summary.errors)));
            out.push_str(&format!("Span: {:.3} ms\n", summary.span_ms));

            if let Some(latency) = &summary.latency_ms {
                out.push_str("\nLatency of done requests (ms):\n");
                out.push_str(&format!("  Average: {:.3}\n", latency.average));
                out.push_str(&format!("  p50: {:.3}\n", latency.p50));
                out.push_str(&format!("  p95: {:.3}\n", latency.p95));
                out.push_str(&format!("  p99: {:.3}\n", latency.p99));
                out.push_str(&format!("  Max: {:.3}\n", latency.max));
            }

            if !summary.error_kinds.is_empty() {
                out.push_str("\nErrors by kind:\n");
                for (kind, count) in &summary.error_kinds {
                    out.push_str(&format!("  {}: {}\n", kind, count));
                }
            }
        }
        ReportFormat::Json => {
            out = serde_json::to_string_pretty(summary)?;
            out.push('\n');
        }
        ReportFormat::Csv => {
            let opt = |v: Option<f64>| v.map(|v| format!("{:.3}", v)).unwrap_or_default();
            let latency = summary.latency_ms.as_ref();

            out.push_str("total,done,past_due,errors,done_rate,span_ms,avg_latency_ms,p50_latency_ms,p95_latency_ms,p99_latency_ms,max_latency_ms\n");
            out.push_str(&format!(
                "{},{},{},{},{:.4},{:.3},{},{},{},{},{}\n",
                summary.total,
                summary.done,
                summary.past_due,
                summary.errors,
                summary.done_rate,
                summary.span_ms,
                opt(latency.map(|l| l.average)),
                opt(latency.map(|l| l.p50)),
                opt(latency.map(|l| l.p95)),
                opt(latency.map(|l| l.p99)),
                opt(latency.map(|l| l.max)),
            ));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSummary {
        let mut summary = ResultSummary {
            total: 4,
            done: 2,
            past_due: 1,
            errors: 1,
            done_rate: 50.0,
            span_ms: 20.0,
            latency_ms: Some(LatencyStats {
                average: 3.0,
                p50: 2.0,
                p95: 4.0,
                p99: 4.0,
                max: 4.0,
            }),
            ..Default::default()
        };
        summary
            .error_kinds
            .insert("openloop::RequestError::Timeout".into(), 1);
        summary
    }

    #[test]
    fn text_report_lists_states_and_error_kinds() {
        let text = render(&sample(), ReportFormat::Text).unwrap();
        assert!(text.contains("Done: 2 (50.0%)"));
        assert!(text.contains("Past due: 1 (25.0%)"));
        assert!(text.contains("openloop::RequestError::Timeout: 1"));
        assert!(text.contains("p95: 4.000"));
    }

    #[test]
    fn json_report_is_machine_readable() {
        let json = render(&sample(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["done"], 2);
        assert_eq!(value["latency_ms"]["p50"], 2.0);
        assert_eq!(value["error_kinds"]["openloop::RequestError::Timeout"], 1);
    }

    #[test]
    fn csv_report_leaves_missing_latency_empty() {
        let summary = ResultSummary {
            total: 1,
            errors: 1,
            ..Default::default()
        };
        let csv = render(&summary, ReportFormat::Csv).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(row, "1,0,0,1,0.0000,0.000,,,,,");
    }
}
