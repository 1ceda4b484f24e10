/// Prediction service clients and backend warm-up.
pub mod client;
pub mod predictor;
pub mod warmup;

pub use client::{ClientConfig, Predictor};
pub use predictor::HttpPredictor;
pub use warmup::warm_up;
