//! The transport boundary: Mattermost REST calls as an async trait.
//!
//! [`ChatApi`] is the only way the rest of the crate talks to the server. Each
//! method performs exactly one remote call and reports failures as an
//! [`ApiError`] carrying the response metadata the retry policy needs.
//!
//! The trait-based design enables:
//! - Scripted mock transports for testing retry and gateway behavior
//! - The reqwest-backed [`RestClient`] for real servers

mod error;
mod rest;

use std::future::Future;

pub use error::{ApiError, ApiErrorKind, ResponseMeta, STATUS_TOO_MANY_REQUESTS, message_from_body};
pub use rest::{API_URL_SUFFIX, RestClient};

use crate::types::{Channel, ChannelId, FileId, FileUploadResponse, Post, PostId, PostList, TeamId, UserId};

/// Options for fetching a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadOptions {
    pub collapsed_threads: bool,

    /// `up` returns the thread from the root downwards.
    pub direction: String,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        ThreadOptions {
            collapsed_threads: false,
            direction: "up".to_string(),
        }
    }
}

/// Executes single Mattermost REST calls.
///
/// # Example (mock for testing)
///
/// ```ignore
/// struct AlwaysRateLimited;
///
/// impl ChatApi for AlwaysRateLimited {
///     async fn create_post(&self, _post: &Post) -> Result<Post, ApiError> {
///         Err(ApiError::rate_limited(Duration::from_secs(1)))
///     }
///     // ...
/// }
/// ```
pub trait ChatApi: Send + Sync {
    fn create_post(&self, post: &Post) -> impl Future<Output = Result<Post, ApiError>> + Send;

    fn update_post(
        &self,
        post_id: &PostId,
        post: &Post,
    ) -> impl Future<Output = Result<Post, ApiError>> + Send;

    fn delete_post(&self, post_id: &PostId) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn get_posts_for_channel(
        &self,
        channel_id: &ChannelId,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Result<PostList, ApiError>> + Send;

    fn get_post_thread(
        &self,
        post_id: &PostId,
        options: &ThreadOptions,
    ) -> impl Future<Output = Result<PostList, ApiError>> + Send;

    /// Posts created or modified after `since` (milliseconds since the epoch).
    fn get_posts_since(
        &self,
        channel_id: &ChannelId,
        since: i64,
    ) -> impl Future<Output = Result<PostList, ApiError>> + Send;

    fn search_posts(
        &self,
        team_id: &TeamId,
        terms: &str,
        is_or_search: bool,
    ) -> impl Future<Output = Result<PostList, ApiError>> + Send;

    /// Creates the direct channel between two users, or returns the existing one.
    fn create_direct_channel(
        &self,
        user_a: &UserId,
        user_b: &UserId,
    ) -> impl Future<Output = Result<Channel, ApiError>> + Send;

    fn upload_file(
        &self,
        data: &[u8],
        channel_id: &ChannelId,
        filename: &str,
    ) -> impl Future<Output = Result<FileUploadResponse, ApiError>> + Send;

    /// Returns the public link of a file. Fails when public links are disabled.
    fn get_file_link(&self, file_id: &FileId) -> impl Future<Output = Result<String, ApiError>> + Send;
}
