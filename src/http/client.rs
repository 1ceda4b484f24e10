/// Prediction client abstraction for the target service.
use crate::error::RequestError;
use serde_json::Value;
use std::time::Duration;

/// Trait for prediction service clients.
///
/// Implementations must be safe to call concurrently: one client is shared
/// by every in-flight request.
#[async_trait::async_trait]
pub trait Predictor: Send + Sync {
    /// Send one encoded input to the service.
    ///
    /// # Returns
    ///
    /// `Ok(Some(output))` for an answer, `Ok(None)` when the service
    /// deliberately declined to answer (e.g. the deadline already passed),
    /// and `Err` for transport or protocol failures.
    async fn predict(&self, input: Value) -> Result<Option<Value>, RequestError>;

    /// Endpoint the client talks to, for logs and error messages.
    fn endpoint(&self) -> &str;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prediction endpoint URL
    pub endpoint: String,
    /// Request timeout
    pub timeout: Duration,
    /// Output value the service uses for "no answer", besides `null`
    pub default_output: Option<String>,
    /// Additional headers
    pub headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: Duration::from_secs(60),
            default_output: None,
            headers: Vec::new(),
        }
    }
}
