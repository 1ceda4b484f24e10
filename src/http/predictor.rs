/// HTTP+JSON prediction client.
use crate::error::{AppError, RequestError};
use crate::http::client::{ClientConfig, Predictor};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Client for a `POST {"input": ...}` → `{"output": ...}` prediction endpoint.
pub struct HttpPredictor {
    client: Client,
    config: ClientConfig,
}

impl HttpPredictor {
    /// Create a new prediction client.
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        if config.endpoint.is_empty() {
            return Err(AppError::Config(
                "Prediction endpoint is required. Specify one with --endpoint.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn is_no_answer(&self, output: &Value) -> bool {
        match (output, &self.config.default_output) {
            (Value::Null, _) => true,
            (Value::String(s), Some(default)) => s == default,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, input: Value) -> Result<Option<Value>, RequestError> {
        let mut req = self.client.post(&self.config.endpoint);
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.json(&PredictRequest { input }).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RequestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| RequestError::Decode(e.to_string()))?;

        // an explicit null is "no answer"; a missing field is a broken reply
        let output = body.output.ok_or_else(|| {
            RequestError::Protocol("response has no `output` field".to_string())
        })?;

        if self.is_no_answer(&output) {
            Ok(None)
        } else {
            Ok(Some(output))
        }
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    input: Value,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    /// `None` when absent, `Some(Value::Null)` for an explicit null
    #[serde(default, deserialize_with = "present")]
    output: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}
