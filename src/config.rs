/// Replay configuration: defaults, TOML loading and validation.
use crate::error::AppError;
use crate::http::ClientConfig;
use crate::payload::PayloadKind;
use crate::trace::TraceColumns;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete configuration of one replay run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Prediction endpoint URL
    pub endpoint: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Output value the service returns instead of `null` for "no answer"
    pub default_output: Option<String>,
    /// How to read the trace
    pub trace: TraceConfig,
    /// Allowed schedule slip before a drift warning, in milliseconds
    pub drift_tolerance_ms: f64,
    /// Grace period for in-flight requests once the trace is exhausted
    pub drain_timeout_ms: u64,
    /// Abort the run on the first per-request error
    pub strict: bool,
    /// Readiness probe run before replay
    pub warmup: WarmupConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout_ms: 60_000,
            default_output: None,
            trace: TraceConfig::default(),
            drift_tolerance_ms: 5.0,
            drain_timeout_ms: 30_000,
            strict: false,
            warmup: WarmupConfig::default(),
        }
    }
}

/// Trace columns and payload interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Payload kind carried by the trace
    pub payload: PayloadKind,
    /// Arrival time column, in milliseconds
    pub time_column: String,
    /// Payload column; defaults per payload kind
    pub payload_column: Option<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            payload: PayloadKind::Numeric,
            time_column: TraceColumns::default().time,
            payload_column: None,
        }
    }
}

impl TraceConfig {
    /// Resolved column names.
    pub fn columns(&self) -> TraceColumns {
        TraceColumns {
            time: self.time_column.clone(),
            payload: self
                .payload_column
                .clone()
                .unwrap_or_else(|| self.payload.default_column().to_string()),
        }
    }
}

/// Warm-up probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Run the probe at all
    pub enabled: bool,
    /// Maximum number of probe requests
    pub attempts: u32,
    /// Fixed sleep between failed attempts, in milliseconds
    pub backoff_ms: u64,
    /// Raw canary payload; defaults per payload kind
    pub canary: Option<String>,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: 10,
            backoff_ms: 1000,
            canary: None,
        }
    }
}

impl WarmupConfig {
    /// Raw canary payload for the given payload kind.
    pub fn canary_for(&self, kind: PayloadKind) -> String {
        self.canary.clone().unwrap_or_else(|| match kind {
            PayloadKind::Numeric => "1.0".to_string(),
            PayloadKind::Text => "Hello, nice to meet you!".to_string(),
        })
    }
}

impl ReplayConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(content)?)
    }

    /// Check the configuration before a run.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.endpoint.trim().is_empty() {
            return Err(AppError::Config(
                "Prediction endpoint is required (--endpoint or `endpoint` in config)".to_string(),
            ));
        }
        if !self.drift_tolerance_ms.is_finite() || self.drift_tolerance_ms < 0.0 {
            return Err(AppError::Config(format!(
                "Drift tolerance must be a non-negative number of milliseconds, got {}",
                self.drift_tolerance_ms
            )));
        }
        if self.warmup.enabled && self.warmup.attempts == 0 {
            return Err(AppError::Config(
                "Warm-up needs at least one attempt (or disable it)".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// HTTP client settings derived from this configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_millis(self.request_timeout_ms),
            default_output: self.default_output.clone(),
            headers: Vec::new(),
        }
    }

    /// Grace period for the draining phase.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
