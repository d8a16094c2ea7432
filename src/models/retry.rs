use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u64,
}

/// What the dispatcher does with a message whose handling failed.
#[derive(Debug, Clone, Default)]
pub enum FailurePolicy {
    /// Log and drop the message.
    #[default]
    Drop,
    /// Retry transient pipeline failures with backoff, then drop.
    Retry(RetryConfig),
    /// Publish the message to the failed queue.
    DeadLetter,
}

impl FailurePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            FailurePolicy::Drop => "drop",
            FailurePolicy::Retry(_) => "retry",
            FailurePolicy::DeadLetter => "dead_letter",
        }
    }
}
