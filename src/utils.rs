use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::models::retry::RetryConfig;

/// JSON logs filtered by `RUST_LOG`, `info` when unset.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(true))
        .try_init();
}

/// Runs `operation` until it succeeds, `should_retry` rejects its error, or
/// `config.max_attempts` is spent. Returns the last error otherwise.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(attempt, "Notification succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !should_retry(&e) {
            debug!(attempt, error = %e, "Error is not retryable");
            return Err(e);
        }

        if attempt >= config.max_attempts {
            warn!(
                max_attempts = config.max_attempts,
                error = %e,
                "Giving up after exhausting retry attempts"
            );
            return Err(e);
        }

        debug!(attempt, delay_ms, error = %e, "Attempt failed, backing off");

        let jitter = rand::random_range(-0.1..=0.1);
        sleep(Duration::from_millis((delay_ms as f64 * (1.0 + jitter)) as u64)).await;

        delay_ms = std::cmp::min(delay_ms * config.backoff_multiplier, config.max_delay_ms);
    }
}
