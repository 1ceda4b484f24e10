/// Error types for the openloop crate.
use thiserror::Error;

/// Errors raised while loading a workload trace.
///
/// Every variant is fatal: a malformed trace aborts the run before any
/// request is dispatched.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    #[error("Invalid value {value:?} in column '{column}' at line {line}: {reason}")]
    InvalidValue {
        line: u64,
        column: String,
        value: String,
        reason: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a single in-flight request.
///
/// These never unwind the replay loop (unless strict mode is on); they are
/// classified with [`RequestError::kind`] and written to the results log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request task panicked: {0}")]
    Panicked(String),

    #[error("Request still pending after {waited_ms} ms of draining")]
    Abandoned { waited_ms: u64 },
}

impl RequestError {
    /// Stable classification string for the results log.
    ///
    /// The message varies from run to run; the kind does not, so result
    /// files stay diffable.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::Connect(_) => "openloop::RequestError::Connect",
            RequestError::Timeout(_) => "openloop::RequestError::Timeout",
            RequestError::Status { .. } => "openloop::RequestError::Status",
            RequestError::Decode(_) => "openloop::RequestError::Decode",
            RequestError::Transport(_) => "openloop::RequestError::Transport",
            RequestError::Protocol(_) => "openloop::RequestError::Protocol",
            RequestError::Panicked(_) => "openloop::RequestError::Panicked",
            RequestError::Abandoned { .. } => "openloop::RequestError::Abandoned",
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RequestError::Timeout(e.to_string())
        } else if e.is_connect() {
            RequestError::Connect(e.to_string())
        } else if e.is_decode() {
            RequestError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            RequestError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            RequestError::Transport(e.to_string())
        }
    }
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed trace: {0}")]
    MalformedTrace(#[from] TraceError),

    #[error("Backend at {endpoint} unavailable after {attempts} warm-up attempts")]
    BackendUnavailable { endpoint: String, attempts: u32 },

    #[error("Request for job {job} failed: {source}")]
    Request {
        job: usize,
        #[source]
        source: RequestError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
