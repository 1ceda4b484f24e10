/// One replay session: load, warm up, pause, replay, record.
use crate::config::ReplayConfig;
use crate::engine::{Replayer, ResultRecorder, RunSummary};
use crate::error::AppError;
use crate::http::{warm_up, Predictor};
use crate::payload::{NumericPayload, Payload, PayloadKind, TextPayload};
use crate::trace::{Schedule, TraceLoader};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Inputs of a replay session beyond the tuning configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Trace CSV to replay
    pub trace: PathBuf,
    /// Results log to create
    pub output: PathBuf,
    /// Wait for a line on stdin between warm-up and replay
    pub pause: bool,
    /// Show a progress bar while dispatching
    pub progress: bool,
}

/// Run a full session against `client`, dispatching on the configured
/// payload kind.
///
/// # Errors
///
/// Fails before any dispatch on a malformed trace or when warm-up is
/// exhausted; the results log then holds only its header (or does not
/// exist, for a malformed trace).
pub async fn run_session<C>(
    client: Arc<C>,
    config: &ReplayConfig,
    options: &SessionOptions,
) -> Result<RunSummary, AppError>
where
    C: Predictor + ?Sized + 'static,
{
    match config.trace.payload {
        PayloadKind::Numeric => run_typed::<C, NumericPayload>(client, config, options).await,
        PayloadKind::Text => run_typed::<C, TextPayload>(client, config, options).await,
    }
}

async fn run_typed<C, P>(
    client: Arc<C>,
    config: &ReplayConfig,
    options: &SessionOptions,
) -> Result<RunSummary, AppError>
where
    C: Predictor + ?Sized + 'static,
    P: Payload,
{
    let schedule: Schedule<P> =
        TraceLoader::new(config.trace.columns()).load_path(&options.trace)?;
    info!(
        jobs = schedule.job_count(),
        trace = %options.trace.display(),
        "trace loaded"
    );

    let mut recorder = ResultRecorder::create(&options.output)?;

    if config.warmup.enabled {
        let raw = config.warmup.canary_for(config.trace.payload);
        let canary = P::parse(&raw)
            .map_err(|e| AppError::Config(format!("Invalid warm-up canary {:?}: {}", raw, e)))?;
        warm_up(client.as_ref(), canary.encode(), &config.warmup).await?;
    }

    if options.pause {
        wait_for_enter().await?;
    }

    #[allow(unused_mut)]
    let mut replayer = Replayer::new(client, config);

    #[cfg(feature = "progress")]
    if options.progress {
        replayer = replayer.with_progress(progress_bar(schedule.job_count() as u64));
    }

    replayer.run(schedule, &mut recorder).await
}

/// Block until the operator presses Enter.
async fn wait_for_enter() -> Result<(), AppError> {
    eprintln!("Backend is ready. Press Enter to start the replay...");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(())
}

#[cfg(feature = "progress")]
fn progress_bar(len: u64) -> Arc<indicatif::ProgressBar> {
    let pb = indicatif::ProgressBar::new(len);
    if let Ok(style) = indicatif::ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("Replaying trace...");
    Arc::new(pb)
}

/// Open a results log for offline reading.
pub fn open_results(path: &std::path::Path) -> Result<File, AppError> {
    File::open(path).map_err(|e| {
        AppError::Io(std::io::Error::other(format!(
            "Failed to open results file {}: {}",
            path.display(),
            e
        )))
    })
}
