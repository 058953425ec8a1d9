//! Retry-with-backoff wrapper for any `LLMClient`.
//!
//! Only errors the policy marks retryable are retried (HTTP 429 by default).
//! Transport failures and other upstream errors surface on the first attempt
//! since generation calls are not idempotent.

use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub retryable: fn(&AppError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            retryable: AppError::is_rate_limited,
        }
    }

    pub fn with_retryable(mut self, retryable: fn(&AppError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn should_retry(&self, error: &AppError, attempt: u32) -> bool {
        attempt < self.max_retries && (self.retryable)(error)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self::with_sleeper(inner, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(inner: C, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<C> LLMClient for RetryingClient<C>
where
    C: LLMClient + Send + Sync,
{
    async fn generate(&self, config: &LLMConfig, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(config, prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if self.policy.should_retry(&err, attempt) => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Upstream rate limit hit, retrying"
                    );
                    self.sleeper.sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    fn rate_limited() -> Result<String> {
        Err(AppError::RateLimited("quota exceeded".to_string()))
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_always_429_makes_four_attempts() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = RetryingClient::with_sleeper(
            ScriptedClient::new((0..10).map(|_| rate_limited()).collect()),
            RetryPolicy::default(),
            sleeper.clone(),
        );

        let result = client.generate(&LLMConfig::default(), "prompt").await;

        assert!(matches!(result, Err(AppError::RateLimited(_))));
        assert_eq!(client.inner.calls(), 4);
        assert_eq!(
            *sleeper.waits.lock().unwrap(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = RetryingClient::with_sleeper(
            ScriptedClient::new(vec![rate_limited(), Ok("{}".to_string())]),
            RetryPolicy::default(),
            sleeper.clone(),
        );

        let text = client.generate(&LLMConfig::default(), "prompt").await.unwrap();

        assert_eq!(text, "{}");
        assert_eq!(client.inner.calls(), 2);
        assert_eq!(sleeper.waits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_and_transport_errors_are_not_retried() {
        for err in [
            AppError::Upstream {
                status: 500,
                body: "boom".to_string(),
            },
            AppError::Transport("timed out".to_string()),
        ] {
            let sleeper = Arc::new(RecordingSleeper::default());
            let client = RetryingClient::with_sleeper(
                ScriptedClient::new(vec![Err(err.clone()), Ok("{}".to_string())]),
                RetryPolicy::default(),
                sleeper.clone(),
            );

            let result = client.generate(&LLMConfig::default(), "prompt").await;

            assert_eq!(result, Err(err));
            assert_eq!(client.inner.calls(), 1);
            assert!(sleeper.waits.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let client = RetryingClient::with_sleeper(
            ScriptedClient::new(vec![
                Err(AppError::Transport("reset".to_string())),
                Ok("ok".to_string()),
            ]),
            RetryPolicy::new(1, Duration::from_millis(10))
                .with_retryable(|e| matches!(e, AppError::Transport(_))),
            Arc::new(RecordingSleeper::default()),
        );

        assert_eq!(client.generate(&LLMConfig::default(), "p").await.unwrap(), "ok");
    }
}
