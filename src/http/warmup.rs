/// Blocking, retry-bounded readiness probe run before replay.
use crate::config::WarmupConfig;
use crate::error::AppError;
use crate::http::client::Predictor;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Probe the backend with a canary request until it answers.
///
/// Any non-error response, including "no answer", counts as ready.
/// Returns the number of attempts used.
///
/// # Errors
///
/// Returns `AppError::BackendUnavailable` when every attempt failed.
pub async fn warm_up<C: Predictor + ?Sized>(
    predictor: &C,
    canary: Value,
    config: &WarmupConfig,
) -> Result<u32, AppError> {
    for attempt in 1..=config.attempts {
        match predictor.predict(canary.clone()).await {
            Ok(_) => {
                info!(attempt, endpoint = predictor.endpoint(), "backend ready to serve");
                return Ok(attempt);
            }
            Err(e) => {
                info!(attempt, error = %e, "waiting for backend to be ready to serve");
                if attempt < config.attempts {
                    sleep(Duration::from_millis(config.backoff_ms)).await;
                }
            }
        }
    }

    warn!(
        attempts = config.attempts,
        endpoint = predictor.endpoint(),
        "backend took too long to become ready"
    );
    Err(AppError::BackendUnavailable {
        endpoint: predictor.endpoint().to_string(),
        attempts: config.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyPredictor {
        failures_before_ready: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Predictor for FlakyPredictor {
        async fn predict(&self, _input: Value) -> Result<Option<Value>, RequestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_ready {
                Err(RequestError::Connect("connection refused".into()))
            } else {
                Ok(None)
            }
        }

        fn endpoint(&self) -> &str {
            "http://mock/predict"
        }
    }

    fn config(attempts: u32) -> WarmupConfig {
        WarmupConfig {
            attempts,
            backoff_ms: 1000,
            ..WarmupConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_ready() {
        let predictor = FlakyPredictor {
            failures_before_ready: 3,
            calls: AtomicU32::new(0),
        };
        let started = tokio::time::Instant::now();

        let attempts = warm_up(&predictor, Value::Null, &config(10))
            .await
            .expect("backend becomes ready");

        assert_eq!(attempts, 4);
        assert_eq!(started.elapsed().as_millis(), 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_is_backend_unavailable() {
        let predictor = FlakyPredictor {
            failures_before_ready: u32::MAX,
            calls: AtomicU32::new(0),
        };

        let err = warm_up(&predictor, Value::Null, &config(10))
            .await
            .unwrap_err();

        assert_eq!(predictor.calls.load(Ordering::SeqCst), 10);
        match err {
            AppError::BackendUnavailable { attempts, endpoint } => {
                assert_eq!(attempts, 10);
                assert_eq!(endpoint, "http://mock/predict");
            }
            other => panic!("expected BackendUnavailable, got {:?}", other),
        }
    }
}
