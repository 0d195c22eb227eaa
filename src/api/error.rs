//! API error types and response metadata.
//!
//! Every transport call reports failures as an [`ApiError`]. The error carries
//! the [`ResponseMeta`] of the failed response, when there was one, because the
//! retry policy decides from the status code and the rate-limit headers rather
//! than from the error message.
//!
//! - **RateLimited**: HTTP 429. Retried after the server's wait hint.
//! - **Permanent**: any other non-success status (auth, validation, not found).
//! - **Transport**: the request never produced a usable response.
//! - **Cancelled**: a rate-limit backoff was abandoned by its caller.

use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;

/// HTTP status the server uses to signal congestion.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// The kind of API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The server rejected the call because of rate limiting (HTTP 429).
    RateLimited,

    /// The server rejected the call for any other reason.
    ///
    /// Examples:
    /// - 400 validation errors (empty message, bad channel ID)
    /// - 401/403 authentication and permission failures
    /// - 404 unknown post or channel
    Permanent,

    /// No HTTP response was received, or its body could not be decoded.
    Transport,

    /// A caller cancelled the call while it was waiting out a rate limit.
    Cancelled,
}

/// Metadata of an HTTP response, as far as retry decisions need it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status_code: u16,

    /// `Retry-After`, in seconds.
    pub retry_after: Option<Duration>,

    /// `X-Ratelimit-Reset`: seconds until the current rate-limit window ends.
    pub ratelimit_reset: Option<Duration>,

    /// `X-Ratelimit-Remaining`: calls left in the current window.
    pub ratelimit_remaining: Option<u64>,
}

impl ResponseMeta {
    pub fn new(status_code: u16) -> Self {
        ResponseMeta {
            status_code,
            ..ResponseMeta::default()
        }
    }

    /// Builds metadata from a status code and response headers.
    ///
    /// Headers that are missing or not a whole number of seconds are ignored.
    pub fn from_headers(status_code: u16, headers: &HeaderMap) -> Self {
        let number = |name: &str| -> Option<u64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        };

        ResponseMeta {
            status_code,
            retry_after: number("retry-after").map(Duration::from_secs),
            ratelimit_reset: number("x-ratelimit-reset").map(Duration::from_secs),
            ratelimit_remaining: number("x-ratelimit-remaining"),
        }
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    pub fn with_ratelimit_reset(mut self, wait: Duration) -> Self {
        self.ratelimit_reset = Some(wait);
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status_code == STATUS_TOO_MANY_REQUESTS
    }

    /// Returns how long the server asked us to wait, preferring `Retry-After`.
    pub fn rate_limit_wait(&self) -> Option<Duration> {
        self.retry_after.or(self.ratelimit_reset)
    }
}

/// An API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct ApiError {
    pub kind: ApiErrorKind,

    /// The HTTP status code, if a response was received.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// Metadata of the failed response, if one was received.
    pub response: Option<ResponseMeta>,

    /// The underlying HTTP client error, if any.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "Mattermost API error (HTTP {}): {}", code, self.message),
            None => write!(f, "Mattermost API error: {}", self.message),
        }
    }
}

impl ApiError {
    /// Categorizes a non-success response.
    pub fn from_response(meta: ResponseMeta, message: impl Into<String>) -> Self {
        let kind = if meta.is_rate_limited() {
            ApiErrorKind::RateLimited
        } else {
            ApiErrorKind::Permanent
        };

        Self {
            kind,
            status_code: Some(meta.status_code),
            message: message.into(),
            response: Some(meta),
            source: None,
        }
    }

    /// A 429 response carrying a `Retry-After` hint.
    pub fn rate_limited(wait: Duration) -> Self {
        Self::from_response(
            ResponseMeta::new(STATUS_TOO_MANY_REQUESTS).with_retry_after(wait),
            "rate limited",
        )
    }

    /// Creates a permanent error without response metadata.
    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            response: None,
            source: None,
        }
    }

    /// Creates a transport error from an HTTP client error.
    pub fn transport(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Transport,
            status_code: source.status().map(|s| s.as_u16()),
            message: format!("{}: {}", message.into(), source),
            response: None,
            source: Some(source),
        }
    }

    /// Creates the error returned when a rate-limit wait is cancelled.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Cancelled,
            status_code: None,
            message: message.into(),
            response: None,
            source: None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ApiErrorKind::RateLimited
    }
}

/// Extracts the `message` field of a Mattermost error body, falling back to
/// the raw body text.
pub fn message_from_body(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct AppError {
        message: String,
    }

    match serde_json::from_str::<AppError>(body) {
        Ok(e) if !e.message.is_empty() => e.message,
        _ => body.trim().to_string(),
    }
}
