/// Console logging setup.
use tracing_subscriber::EnvFilter;

/// Build the event filter for a `--log-level` value.
///
/// An unparsable level falls back to `RUST_LOG`, then to `info`.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for reports.
///
/// An already-installed subscriber is kept.
pub fn init_logging(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
