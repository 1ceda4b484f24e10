/// CLI argument parsing and command execution.
use crate::config::ReplayConfig;
use crate::engine::read_records;
use crate::error::AppError;
use crate::http::HttpPredictor;
use crate::logging::init_logging;
use crate::payload::{NumericPayload, Payload, PayloadKind, TextPayload};
use crate::report::{render, ReportFormat, ResultSummary};
use crate::session::{open_results, run_session, SessionOptions};
use crate::trace::synth::{generate, write_trace};
use crate::trace::{LengthDistribution, Schedule, SynthConfig, TraceColumns, TraceLoader};
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Openloop - Replay a recorded workload trace against a prediction service.
#[derive(Parser, Debug)]
#[command(name = "openloop")]
#[command(about = "Open-loop, trace-driven load generator for inference services")]
#[command(
    long_about = r#"Openloop - Open-loop, trace-driven load generator for inference services

Requests are dispatched at the arrival times recorded in a CSV trace,
regardless of how fast the service answers. Every request gets one line in
the results log (Timestamp,Echo,LatencyUS,State,EName).

EXAMPLES:
  # Replay a trace against a local service
  openloop replay trace.csv --endpoint http://127.0.0.1:1337/model/predict

  # Replay text inputs, treating "None" as no answer
  openloop replay sentences.csv --payload text --default-output None

  # Inspect how a trace will be batched
  openloop inspect trace.csv

  # Summarize a results log
  openloop summarize output.csv --format json

  # Generate a synthetic Poisson trace
  openloop generate --rate 50 --count 1000 --lengths exp:20 -o trace.csv"#
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter, e.g. info, debug or openloop=trace
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Warm up the backend, replay a trace and record every outcome
    Replay(ReplayArgs),

    /// Print the batch schedule of a trace without sending requests
    Inspect {
        /// Trace CSV file
        #[arg(value_name = "TRACE")]
        trace: PathBuf,

        /// Payload kind carried by the trace
        #[arg(long, value_enum, default_value = "numeric")]
        payload: PayloadKind,

        /// Arrival time column
        #[arg(long, default_value = "Admitted")]
        time_column: String,

        /// Payload column (defaults per payload kind)
        #[arg(long)]
        payload_column: Option<String>,
    },

    /// Summarize a results log
    Summarize {
        /// Results CSV written by `replay`
        #[arg(value_name = "RESULTS")]
        results: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,
    },

    /// Write a synthetic trace with Poisson arrivals
    Generate {
        /// Mean arrival rate in jobs per second
        #[arg(long)]
        rate: f64,

        /// Number of jobs
        #[arg(long)]
        count: usize,

        /// Job length distribution: const:X, uniform:LO-HI or exp:MEAN (ms)
        #[arg(long, default_value = "const:10")]
        lengths: LengthDistribution,

        /// Add a Deadline column at arrival plus this budget (ms)
        #[arg(long)]
        budget_ms: Option<f64>,

        /// Seed for a reproducible trace
        #[arg(long)]
        seed: Option<u64>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Arguments of the `replay` subcommand.
///
/// Flags override values loaded from `--config`.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Trace CSV file
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Prediction endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Payload kind carried by the trace
    #[arg(long, value_enum)]
    pub payload: Option<PayloadKind>,

    /// Arrival time column
    #[arg(long)]
    pub time_column: Option<String>,

    /// Payload column
    #[arg(long)]
    pub payload_column: Option<String>,

    /// Abort on the first request error
    #[arg(long)]
    pub debug: bool,

    /// Wait for Enter after warm-up
    #[arg(long)]
    pub pause: bool,

    /// Per-request timeout (ms)
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Grace period for in-flight requests after the last batch (ms)
    #[arg(long)]
    pub drain_timeout_ms: Option<u64>,

    /// Allowed schedule slip before a drift warning (ms)
    #[arg(long)]
    pub drift_tolerance_ms: Option<f64>,

    /// Maximum warm-up probes
    #[arg(long)]
    pub warmup_attempts: Option<u32>,

    /// Sleep between warm-up probes (ms)
    #[arg(long)]
    pub warmup_backoff_ms: Option<u64>,

    /// Raw payload used for warm-up probes
    #[arg(long)]
    pub canary: Option<String>,

    /// Skip the warm-up probe
    #[arg(long)]
    pub no_warmup: bool,

    /// Output value the service returns for "no answer"
    #[arg(long)]
    pub default_output: Option<String>,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Results log
    #[arg(short, long, default_value = "output.csv")]
    pub output: PathBuf,
}

impl ReplayArgs {
    /// Merge the config file (if any) with flag overrides and validate.
    pub fn resolve_config(&self) -> Result<ReplayConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => ReplayConfig::from_file(path)?,
            None => ReplayConfig::default(),
        };

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(payload) = self.payload {
            config.trace.payload = payload;
        }
        if let Some(column) = &self.time_column {
            config.trace.time_column = column.clone();
        }
        if let Some(column) = &self.payload_column {
            config.trace.payload_column = Some(column.clone());
        }
        if self.debug {
            config.strict = true;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout_ms = ms;
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.drain_timeout_ms = ms;
        }
        if let Some(ms) = self.drift_tolerance_ms {
            config.drift_tolerance_ms = ms;
        }
        if let Some(attempts) = self.warmup_attempts {
            config.warmup.attempts = attempts;
        }
        if let Some(ms) = self.warmup_backoff_ms {
            config.warmup.backoff_ms = ms;
        }
        if let Some(canary) = &self.canary {
            config.warmup.canary = Some(canary.clone());
        }
        if self.no_warmup {
            config.warmup.enabled = false;
        }
        if let Some(default_output) = &self.default_output {
            config.default_output = Some(default_output.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

impl Cli {
    pub fn run(self) -> Result<(), AppError> {
        init_logging(&self.log_level);

        match self.command {
            Command::Replay(args) => Self::run_replay(args),
            Command::Inspect {
                trace,
                payload,
                time_column,
                payload_column,
            } => {
                let loader = TraceLoader::new(TraceColumns {
                    time: time_column,
                    payload: payload_column
                        .unwrap_or_else(|| payload.default_column().to_string()),
                });
                match payload {
                    PayloadKind::Numeric => {
                        Self::run_inspect(loader.load_path::<NumericPayload>(&trace)?)
                    }
                    PayloadKind::Text => Self::run_inspect(loader.load_path::<TextPayload>(&trace)?),
                }
            }
            Command::Summarize { results, format } => {
                let records = read_records(open_results(&results)?)?;
                let summary = ResultSummary::from_records(&records);
                print!("{}", render(&summary, format)?);
                Ok(())
            }
            Command::Generate {
                rate,
                count,
                lengths,
                budget_ms,
                seed,
                output,
            } => Self::run_generate(
                SynthConfig {
                    rate,
                    count,
                    lengths,
                    budget_ms,
                    seed,
                },
                output,
            ),
        }
    }

    fn run_replay(args: ReplayArgs) -> Result<(), AppError> {
        let config = args.resolve_config()?;
        let client = Arc::new(HttpPredictor::new(config.client_config())?);

        let options = SessionOptions {
            trace: args.trace,
            output: args.output,
            pause: args.pause,
            progress: args.progress,
        };

        // one cooperative scheduler: every request and the pacing loop share it
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create async runtime: {}", e)))?;

        let summary = rt.block_on(run_session(client, &config, &options))?;

        eprintln!(
            "Replayed {} jobs in {} batches: {} done, {} past due, {} errors ({} abandoned). Results in {}",
            summary.dispatched,
            summary.batches,
            summary.done,
            summary.past_due,
            summary.errors,
            summary.abandoned,
            options.output.display()
        );
        Ok(())
    }

    fn run_inspect<P: Payload>(schedule: Schedule<P>) -> Result<(), AppError> {
        let jobs = schedule.job_count();
        let stdout = io::stdout();
        let mut out = stdout.lock();

        writeln!(out, "{:>6}  {:>12}  {:>12}  {:>5}", "batch", "offset_ms", "delay_ms", "jobs")?;
        let mut batches = 0;
        for (index, (batch, delay_ms)) in schedule.enumerate() {
            writeln!(
                out,
                "{:>6}  {:>12.3}  {:>12.3}  {:>5}",
                index,
                batch.arrival_offset_ms,
                delay_ms,
                batch.len()
            )?;
            batches += 1;
        }
        writeln!(out, "{} jobs in {} batches", jobs, batches)?;
        Ok(())
    }

    fn run_generate(config: SynthConfig, output: Option<PathBuf>) -> Result<(), AppError> {
        let jobs = generate(&config)?;
        let with_deadline = config.budget_ms.is_some();

        match output {
            Some(path) => {
                let file = std::fs::File::create(&path).map_err(|e| {
                    AppError::Io(std::io::Error::other(format!(
                        "Failed to create trace file {}: {}",
                        path.display(),
                        e
                    )))
                })?;
                write_trace(&jobs, with_deadline, file)?;
                eprintln!(
                    "Wrote {} jobs ({} at {} jobs/s) to {}",
                    jobs.len(),
                    config.lengths,
                    config.rate,
                    path.display()
                );
            }
            None => write_trace(&jobs, with_deadline, io::stdout().lock())?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_replay_arguments() {
        let cli = Cli::try_parse_from([
            "openloop",
            "replay",
            "trace.csv",
            "--endpoint",
            "http://127.0.0.1:1337/model/predict",
            "--payload",
            "text",
            "--debug",
            "--no-warmup",
            "--drain-timeout-ms",
            "500",
        ])
        .expect("CLI args should parse");

        assert_eq!(cli.log_level, "info");
        let Command::Replay(args) = cli.command else {
            panic!("replay subcommand expected");
        };
        assert_eq!(args.trace, PathBuf::from("trace.csv"));
        assert_eq!(args.output, PathBuf::from("output.csv"));

        let config = args.resolve_config().expect("config should resolve");
        assert!(config.strict);
        assert!(!config.warmup.enabled);
        assert_eq!(config.drain_timeout_ms, 500);
        assert_eq!(config.trace.payload, PayloadKind::Text);
        assert_eq!(config.trace.columns().payload, "InputSen");
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            endpoint = "http://from-file/predict"
            drift_tolerance_ms = 2.0

            [warmup]
            attempts = 3
            "#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from([
            "openloop",
            "replay",
            "trace.csv",
            "--config",
            &path,
            "--warmup-attempts",
            "5",
        ])
        .unwrap();
        let Command::Replay(args) = cli.command else {
            panic!("replay subcommand expected");
        };

        let config = args.resolve_config().unwrap();
        assert_eq!(config.endpoint, "http://from-file/predict");
        assert_eq!(config.drift_tolerance_ms, 2.0);
        assert_eq!(config.warmup.attempts, 5);
    }

    #[test]
    fn replay_without_endpoint_is_a_config_error() {
        let cli = Cli::try_parse_from(["openloop", "replay", "trace.csv"]).unwrap();
        let Command::Replay(args) = cli.command else {
            panic!("replay subcommand expected");
        };
        assert!(matches!(args.resolve_config(), Err(AppError::Config(_))));
    }

    #[test]
    fn parse_generate_arguments() {
        let cli = Cli::try_parse_from([
            "openloop",
            "--log-level",
            "debug",
            "generate",
            "--rate",
            "20",
            "--count",
            "100",
            "--lengths",
            "uniform:1-5",
            "--seed",
            "42",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Command::Generate {
                rate,
                count,
                lengths,
                seed,
                output,
                ..
            } => {
                assert_eq!(rate, 20.0);
                assert_eq!(count, 100);
                assert_eq!(
                    lengths,
                    LengthDistribution::Uniform {
                        low: 1.0,
                        high: 5.0
                    }
                );
                assert_eq!(seed, Some(42));
                assert!(output.is_none());
            }
            other => panic!("expected generate, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_length_distribution() {
        let result = Cli::try_parse_from([
            "openloop", "generate", "--rate", "1", "--count", "1", "--lengths", "normal:3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_summarize_format() {
        let cli =
            Cli::try_parse_from(["openloop", "summarize", "output.csv", "--format", "csv"]).unwrap();
        match cli.command {
            Command::Summarize { format, .. } => assert_eq!(format, ReportFormat::Csv),
            other => panic!("expected summarize, got {:?}", other),
        }
    }
}
