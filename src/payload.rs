/// Payload adapters relayed from the trace to the prediction service.
use crate::error::RequestError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A job payload.
///
/// The replay engine never looks inside a payload: it parses one from a
/// trace cell, encodes it as the request input and decodes the service
/// output into the text written to the `Echo` column.
pub trait Payload: Clone + fmt::Debug + Send + Sync + 'static {
    /// Parse a payload from a raw trace cell.
    fn parse(raw: &str) -> Result<Self, String>;

    /// Request input sent to the prediction service.
    fn encode(&self) -> Value;

    /// Turn a non-null service output into its echo representation.
    fn decode(output: &Value) -> Result<String, RequestError>;

    /// Short description used in progress logs.
    fn describe(&self) -> String;
}

/// Payload kinds selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// Numeric duration in milliseconds, echoed back in microseconds
    #[default]
    Numeric,
    /// Free text, echoed back verbatim
    Text,
}

impl PayloadKind {
    /// Default trace column holding this payload.
    pub fn default_column(&self) -> &'static str {
        match self {
            PayloadKind::Numeric => "Length",
            PayloadKind::Text => "InputSen",
        }
    }
}

/// Simulated inference length in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericPayload(pub f64);

impl Payload for NumericPayload {
    fn parse(raw: &str) -> Result<Self, String> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|e| format!("not a number: {}", e))?;
        if !value.is_finite() {
            return Err("not a finite number".to_string());
        }
        Ok(Self(value))
    }

    fn encode(&self) -> Value {
        serde_json::json!([self.0])
    }

    fn decode(output: &Value) -> Result<String, RequestError> {
        let length_ms = match output {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| RequestError::Protocol(format!("expected numeric output, got {}", output)))?;

        Ok(format!("{}", length_ms * 1000.0))
    }

    fn describe(&self) -> String {
        format!("{:.3} ms", self.0)
    }
}

/// Free-text input, e.g. a sentence to translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPayload(pub String);

impl Payload for TextPayload {
    fn parse(raw: &str) -> Result<Self, String> {
        Ok(Self(raw.to_string()))
    }

    fn encode(&self) -> Value {
        Value::String(self.0.clone())
    }

    fn decode(output: &Value) -> Result<String, RequestError> {
        match output {
            Value::String(s) => Ok(s.clone()),
            other => Ok(other.to_string()),
        }
    }

    fn describe(&self) -> String {
        let preview: String = self.0.chars().take(16).collect();
        if preview.len() < self.0.len() {
            format!("{:?}...", preview)
        } else {
            format!("{:?}", preview)
        }
    }
}
