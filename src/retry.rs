//! Rate-limit-aware retry for Mattermost API calls.
//!
//! Congestion is never fatal: a call rejected with HTTP 429 is retried after the
//! wait the server asks for, for as long as the server keeps rate limiting.
//! Any other failure is returned to the caller after the first attempt.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Attempting ──ok──────────────▶ Succeeded
//!     │  └──not rate limited──▶ Failed
//!     └──rate limited─────────▶ BackingOff ──delay elapsed──▶ Attempting
//! ```
//!
//! Sleeping goes through a [`Sleeper`] so tests can run the loop without real
//! delays. The sleep happens outside any lock and blocks only the calling task.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::ApiError;

/// Suspends the calling task for a rate-limit backoff.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Configuration for rate-limit retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first. `None` retries for as
    /// long as the server keeps rate limiting.
    pub max_attempts: Option<u32>,

    /// Wait used when a 429 response carries no usable wait hint. `None`
    /// treats such a response as a terminal error.
    pub fallback_delay: Option<Duration>,
}

impl RetryConfig {
    /// Retry rate-limited calls indefinitely, only when the server says how long to wait.
    pub const UNBOUNDED: Self = Self {
        max_attempts: None,
        fallback_delay: None,
    };

    pub fn new(max_attempts: Option<u32>, fallback_delay: Option<Duration>) -> Self {
        Self {
            max_attempts,
            fallback_delay,
        }
    }

    /// Gives up after `max_attempts` attempts.
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::UNBOUNDED
        }
    }

    /// Returns the backoff to apply before retrying after `error`, or `None`
    /// if `error` is not a rate-limit condition.
    ///
    /// The decision reads the response metadata only: HTTP 429 with a
    /// `Retry-After` or `X-Ratelimit-Reset` hint waits for the hint.
    pub fn backoff_for(&self, error: &ApiError) -> Option<Duration> {
        let meta = error.response.as_ref()?;
        if !meta.is_rate_limited() {
            return None;
        }
        meta.rate_limit_wait().or(self.fallback_delay)
    }

    fn attempts_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// Retry policy for controlling retry behavior at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry rate-limited calls after the server's backoff.
    #[default]
    RetryRateLimited,

    /// Do not retry - return errors immediately.
    NoRetry,
}

/// Result of a retried call.
#[derive(Debug)]
pub enum RetryResult<T> {
    /// The operation succeeded.
    Success(T),

    /// The operation failed with an error that is not a rate limit.
    NotRetriable(ApiError),

    /// Still rate limited when the configured attempts ran out.
    ExhaustedRetries { last_error: ApiError, attempts: u32 },

    /// The caller cancelled the call during a backoff.
    Cancelled { last_error: ApiError, attempts: u32 },
}

impl<T> RetryResult<T> {
    /// Converts to a Result, keeping the last server error where there is one.
    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::NotRetriable(e) => Err(e),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::Cancelled { last_error, .. } => Err(ApiError::cancelled(format!(
                "cancelled while rate limited: {}",
                last_error
            ))),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

enum RetryState<T> {
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration, error: ApiError },
    Succeeded(T),
    Failed(RetryResult<T>),
}

/// Runs operations under the rate-limit retry discipline.
#[derive(Debug, Clone, Default)]
pub struct Retrier<S = TokioSleeper> {
    config: RetryConfig,
    policy: RetryPolicy,
    sleeper: S,
    cancel: Option<CancellationToken>,
}

impl Retrier<TokioSleeper> {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_sleeper(config, TokioSleeper)
    }
}

impl<S: Sleeper> Retrier<S> {
    pub fn with_sleeper(config: RetryConfig, sleeper: S) -> Self {
        Retrier {
            config,
            policy: RetryPolicy::default(),
            sleeper,
            cancel: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abandons backoffs when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> RetryConfig {
        self.config
    }

    /// Runs `operation` until it succeeds or fails with something other than
    /// a rate limit.
    ///
    /// `name` identifies the call in logs.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut state = RetryState::Attempting { attempt: 1 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => match operation().await {
                    Ok(value) => RetryState::Succeeded(value),
                    Err(error) => self.after_failure(name, attempt, error),
                },
                RetryState::BackingOff {
                    attempt,
                    delay,
                    error,
                } => {
                    info!(call = name, wait = ?delay, attempt, "Rate limited, backing off");
                    if self.wait(delay).await {
                        RetryState::Attempting {
                            attempt: attempt + 1,
                        }
                    } else {
                        debug!(call = name, attempt, "Backoff cancelled");
                        RetryState::Failed(RetryResult::Cancelled {
                            last_error: error,
                            attempts: attempt,
                        })
                    }
                }
                RetryState::Succeeded(value) => return RetryResult::Success(value),
                RetryState::Failed(result) => return result,
            };
        }
    }

    /// Like [`Retrier::run`], flattened into a `Result`.
    pub async fn call<T, F, Fut>(&self, name: &str, operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.run(name, operation).await.into_result()
    }

    fn after_failure<T>(&self, name: &str, attempt: u32, error: ApiError) -> RetryState<T> {
        if self.policy == RetryPolicy::NoRetry {
            return RetryState::Failed(RetryResult::NotRetriable(error));
        }

        let Some(delay) = self.config.backoff_for(&error) else {
            debug!(call = name, attempt, error = %error, "Call failed, not retrying");
            return RetryState::Failed(RetryResult::NotRetriable(error));
        };

        if self.config.attempts_exhausted(attempt) {
            return RetryState::Failed(RetryResult::ExhaustedRetries {
                last_error: error,
                attempts: attempt,
            });
        }

        RetryState::BackingOff {
            attempt,
            delay,
            error,
        }
    }

    /// Sleeps for `delay`. Returns false if cancelled first.
    async fn wait(&self, delay: Duration) -> bool {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => false,
                    _ = self.sleeper.sleep(delay) => true,
                }
            }
            None => {
                self.sleeper.sleep(delay).await;
                true
            }
        }
    }
}

/// Executes an async operation, waiting out rate limits.
///
/// # Arguments
///
/// * `name` - Identifies the call in logs
/// * `config` - Attempt bound and fallback wait
/// * `sleeper` - Performs the backoff waits
/// * `operation` - Performs one remote call. Called again after each rate
///   limit until it succeeds or fails otherwise.
pub async fn retry_rate_limited<T, S, F, Fut>(
    name: &str,
    config: RetryConfig,
    sleeper: S,
    operation: F,
) -> RetryResult<T>
where
    S: Sleeper,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    Retrier::with_sleeper(config, sleeper).run(name, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiErrorKind, ResponseMeta};
    use crate::test_utils::RecordingSleeper;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retrier(config: RetryConfig) -> (Retrier<RecordingSleeper>, RecordingSleeper) {
        let sleeper = RecordingSleeper::default();
        (Retrier::with_sleeper(config, sleeper.clone()), sleeper)
    }

    // ─── Policy ───

    #[test]
    fn backoff_uses_server_hint() {
        let err = ApiError::rate_limited(Duration::from_secs(3));
        assert_eq!(
            RetryConfig::UNBOUNDED.backoff_for(&err),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn backoff_uses_ratelimit_reset_header() {
        let meta = ResponseMeta::new(429).with_ratelimit_reset(Duration::from_secs(7));
        let err = ApiError::from_response(meta, "too many requests");
        assert_eq!(
            RetryConfig::UNBOUNDED.backoff_for(&err),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn no_backoff_for_429_without_hint_unless_fallback() {
        let err = ApiError::from_response(ResponseMeta::new(429), "too many requests");
        assert_eq!(RetryConfig::UNBOUNDED.backoff_for(&err), None);

        let config = RetryConfig::new(None, Some(Duration::from_secs(1)));
        assert_eq!(config.backoff_for(&err), Some(Duration::from_secs(1)));
    }

    #[test]
    fn no_backoff_for_other_errors() {
        let config = RetryConfig::new(None, Some(Duration::from_secs(1)));
        let not_found = ApiError::from_response(ResponseMeta::new(404), "not found");
        let server = ApiError::from_response(
            ResponseMeta::new(503).with_retry_after(Duration::from_secs(1)),
            "unavailable",
        );
        let local = ApiError::permanent_without_source("bad");

        assert_eq!(config.backoff_for(&not_found), None);
        assert_eq!(config.backoff_for(&server), None);
        assert_eq!(config.backoff_for(&local), None);
    }

    // ─── Loop ───

    #[tokio::test]
    async fn success_on_first_attempt() {
        let (retrier, sleeper) = retrier(RetryConfig::UNBOUNDED);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .run("CreatePost", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ApiError>(42) }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_n_times_then_success_makes_n_plus_one_attempts() {
        let (retrier, sleeper) = retrier(RetryConfig::UNBOUNDED);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        const RATE_LIMITED: u32 = 5;

        let result = retrier
            .run("CreatePost", move || {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < RATE_LIMITED {
                        Err(ApiError::rate_limited(Duration::from_secs(2)))
                    } else {
                        Ok("post-id")
                    }
                }
            })
            .await;

        match result {
            RetryResult::Success(v) => assert_eq!(v, "post-id"),
            other => panic!("Expected success, got {:?}", other),
        }
        assert_eq!(counter.load(Ordering::SeqCst), RATE_LIMITED + 1);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(2); RATE_LIMITED as usize]
        );
    }

    #[tokio::test]
    async fn free_function_matches_retrier() {
        let sleeper = RecordingSleeper::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_rate_limited(
            "CreateDirectChannel",
            RetryConfig::UNBOUNDED,
            sleeper.clone(),
            move || {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count == 0 {
                        Err(ApiError::rate_limited(Duration::from_millis(500)))
                    } else {
                        Ok(count)
                    }
                }
            },
        )
        .await;

        assert!(matches!(result, RetryResult::Success(1)));
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test]
    async fn non_rate_limit_error_is_returned_after_one_attempt() {
        let (retrier, sleeper) = retrier(RetryConfig::UNBOUNDED);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .call("DeletePost", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(ApiError::from_response(
                        ResponseMeta::new(403),
                        "permission denied",
                    ))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Permanent);
        assert_eq!(err.message, "permission denied");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn bounded_config_exhausts() {
        let (retrier, sleeper) = retrier(RetryConfig::bounded(3));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .run("CreatePost", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(ApiError::rate_limited(Duration::from_millis(10))) }
            })
            .await;

        match result {
            RetryResult::ExhaustedRetries { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.is_rate_limited());
            }
            other => panic!("Expected ExhaustedRetries, got {:?}", other),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn no_retry_policy_returns_immediately() {
        let (retrier, _sleeper) = retrier(RetryConfig::UNBOUNDED);
        let retrier = retrier.with_policy(RetryPolicy::NoRetry);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .run("SearchPosts", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(ApiError::rate_limited(Duration::from_secs(1))) }
            })
            .await;

        assert!(matches!(result, RetryResult::NotRetriable(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_abandons_backoff() {
        let token = CancellationToken::new();
        token.cancel();
        let retrier = Retrier::with_sleeper(RetryConfig::UNBOUNDED, RecordingSleeper::default())
            .with_cancellation(token);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .run("CreatePost", move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(ApiError::rate_limited(Duration::from_secs(60))) }
            })
            .await;

        assert!(matches!(result, RetryResult::Cancelled { attempts: 1, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let err = result.into_result().unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_waits_for_the_hint() {
        let retrier = Retrier::new(RetryConfig::UNBOUNDED);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let started = tokio::time::Instant::now();

        let value = retrier
            .call("GetPostsSince", move || {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count == 0 {
                        Err(ApiError::rate_limited(Duration::from_secs(30)))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    // ─── Property Tests ───

    proptest! {
        #[test]
        fn backoff_only_for_429(status in 100u16..600, wait in 0u64..3600) {
            let meta = ResponseMeta::new(status).with_retry_after(Duration::from_secs(wait));
            let err = ApiError::from_response(meta, "x");
            let backoff = RetryConfig::UNBOUNDED.backoff_for(&err);
            if status == 429 {
                prop_assert_eq!(backoff, Some(Duration::from_secs(wait)));
            } else {
                prop_assert_eq!(backoff, None);
            }
        }
    }
}
