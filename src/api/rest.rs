//! reqwest-backed [`ChatApi`] for Mattermost REST API v4.
//!
//! Authentication is a static personal access or bot token sent as a bearer
//! header. Login flows, session refresh and the WebSocket connection belong to
//! the embedding application.

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::config::RelayConfig;
use crate::types::{
    Channel, ChannelId, FileId, FileUploadResponse, Post, PostId, PostList, TeamId, UserId,
};

use super::error::{ApiError, ResponseMeta, message_from_body};
use super::{ChatApi, ThreadOptions};

/// Path prefix of every REST endpoint.
pub const API_URL_SUFFIX: &str = "/api/v4";

/// A Mattermost REST client bound to one server and one token.
#[derive(Clone)]
pub struct RestClient {
    http: Client,

    /// `https://chat.example.com/api/v4`, without trailing slash.
    base_url: String,

    token: String,
}

impl RestClient {
    /// Creates a client for `server` (host and optional port, no scheme).
    pub fn new(server: &str, no_tls: bool, token: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("mattermost-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::transport("failed to build HTTP client", e))?;

        let scheme = if no_tls { "http" } else { "https" };
        Ok(RestClient {
            http,
            base_url: format!("{}://{}{}", scheme, server.trim_end_matches('/'), API_URL_SUFFIX),
            token: token.into(),
        })
    }

    /// Creates a client from the relay configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ApiError> {
        Self::new(&config.server, config.no_tls, config.token.clone())
    }

    /// Returns the API base URL, including the `/api/v4` suffix.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::transport("request failed", e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let meta = ResponseMeta::from_headers(status.as_u16(), response.headers());
        let body = response.text().await.unwrap_or_default();
        trace!(status = status.as_u16(), body = %body, "API call failed");
        Err(ApiError::from_response(meta, message_from_body(&body)))
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::transport("invalid response body", e))
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct FileLinkResponse {
    link: String,
}

impl ChatApi for RestClient {
    async fn create_post(&self, post: &Post) -> Result<Post, ApiError> {
        self.execute_json(self.http.post(self.url("/posts")).json(post))
            .await
    }

    async fn update_post(&self, post_id: &PostId, post: &Post) -> Result<Post, ApiError> {
        let url = self.url(&format!("/posts/{}", post_id));
        self.execute_json(self.http.put(url).json(post)).await
    }

    async fn delete_post(&self, post_id: &PostId) -> Result<(), ApiError> {
        let url = self.url(&format!("/posts/{}", post_id));
        self.execute(self.http.delete(url)).await.map(|_| ())
    }

    async fn get_posts_for_channel(
        &self,
        channel_id: &ChannelId,
        page: u32,
        per_page: u32,
    ) -> Result<PostList, ApiError> {
        let url = self.url(&format!("/channels/{}/posts", channel_id));
        let request = self
            .http
            .get(url)
            .query(&[("page", page), ("per_page", per_page)]);
        self.execute_json(request).await
    }

    async fn get_post_thread(
        &self,
        post_id: &PostId,
        options: &ThreadOptions,
    ) -> Result<PostList, ApiError> {
        let url = self.url(&format!("/posts/{}/thread", post_id));
        let request = self.http.get(url).query(&[
            ("collapsedThreads", options.collapsed_threads.to_string()),
            ("direction", options.direction.clone()),
        ]);
        self.execute_json(request).await
    }

    async fn get_posts_since(&self, channel_id: &ChannelId, since: i64) -> Result<PostList, ApiError> {
        let url = self.url(&format!("/channels/{}/posts", channel_id));
        self.execute_json(self.http.get(url).query(&[("since", since)]))
            .await
    }

    async fn search_posts(
        &self,
        team_id: &TeamId,
        terms: &str,
        is_or_search: bool,
    ) -> Result<PostList, ApiError> {
        let url = self.url(&format!("/teams/{}/posts/search", team_id));
        let body = serde_json::json!({ "terms": terms, "is_or_search": is_or_search });
        self.execute_json(self.http.post(url).json(&body)).await
    }

    async fn create_direct_channel(&self, user_a: &UserId, user_b: &UserId) -> Result<Channel, ApiError> {
        let body = [user_a, user_b];
        self.execute_json(self.http.post(self.url("/channels/direct")).json(&body))
            .await
    }

    async fn upload_file(
        &self,
        data: &[u8],
        channel_id: &ChannelId,
        filename: &str,
    ) -> Result<FileUploadResponse, ApiError> {
        let request = self
            .http
            .post(self.url("/files"))
            .query(&[("channel_id", channel_id.as_str()), ("filename", filename)])
            .body(data.to_vec());
        self.execute_json(request).await
    }

    async fn get_file_link(&self, file_id: &FileId) -> Result<String, ApiError> {
        let url = self.url(&format!("/files/{}/link", file_id));
        let response: FileLinkResponse = self.execute_json(self.http.get(url)).await?;
        Ok(response.link)
    }
}
