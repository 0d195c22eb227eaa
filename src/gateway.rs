//! Outbound operations against the chat server.
//!
//! [`MessageGateway`] builds each outbound payload and sends it through the
//! [`Retrier`]. Operations fall into three groups:
//!
//! | Operation | Rate limited | Other errors |
//! |-----------|--------------|--------------|
//! | post, edit, delete, direct message | retried | returned |
//! | get posts, thread, posts since | retried | `None` (logged) |
//! | upload, search, file links | single attempt | returned, `None` or fallback |

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::api::{API_URL_SUFFIX, ApiError, ChatApi, ThreadOptions};
use crate::config::RelayConfig;
use crate::directory::{Directory, IdentityResolver};
use crate::retry::{Retrier, Sleeper, TokioSleeper};
use crate::types::{ChannelId, FileId, Post, PostId, PostList, Props, TeamId, UserId};

/// Errors from gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The server rejected the call, or could not be reached.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The upload succeeded but the server described no stored file.
    #[error("upload of {filename} returned no file info")]
    EmptyUpload { filename: String },
}

/// The public operation set for sending to and reading from the server.
#[derive(Debug)]
pub struct MessageGateway<A, D, S = TokioSleeper> {
    api: Arc<A>,
    resolver: IdentityResolver<D>,
    retrier: Retrier<S>,
    scheme: &'static str,
    server: String,
    team_id: TeamId,
    user_id: UserId,
}

impl<A: ChatApi, D: Directory> MessageGateway<A, D, TokioSleeper> {
    pub fn new(api: Arc<A>, resolver: IdentityResolver<D>, config: &RelayConfig) -> Self {
        Self::with_retrier(api, resolver, config, Retrier::new(config.retry_config()))
    }
}

impl<A: ChatApi, D: Directory, S: Sleeper> MessageGateway<A, D, S> {
    pub fn with_retrier(
        api: Arc<A>,
        resolver: IdentityResolver<D>,
        config: &RelayConfig,
        retrier: Retrier<S>,
    ) -> Self {
        MessageGateway {
            api,
            resolver,
            retrier,
            scheme: config.scheme(),
            server: config.server.clone(),
            team_id: config.team_id.clone(),
            user_id: config.user_id.clone(),
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn resolver(&self) -> &IdentityResolver<D> {
        &self.resolver
    }

    // ─── Writes ───

    /// Posts `text` to a channel, optionally as a reply to `root_id`.
    /// Returns the new post's ID.
    #[instrument(skip(self, text, props), fields(channel_id = %channel_id))]
    pub async fn post_message(
        &self,
        channel_id: &ChannelId,
        text: &str,
        root_id: Option<&PostId>,
        props: Option<Props>,
    ) -> Result<PostId, GatewayError> {
        let post = outbound_post(channel_id.clone(), text.to_string(), root_id, props);
        self.create_post(post).await
    }

    /// Like [`MessageGateway::post_message`], attaching previously uploaded files.
    #[instrument(skip(self, text, props), fields(channel_id = %channel_id, files = file_ids.len()))]
    pub async fn post_message_with_files(
        &self,
        channel_id: &ChannelId,
        text: &str,
        root_id: Option<&PostId>,
        file_ids: Vec<FileId>,
        props: Option<Props>,
    ) -> Result<PostId, GatewayError> {
        let mut post = outbound_post(channel_id.clone(), text.to_string(), root_id, props);
        post.file_ids = Some(file_ids);
        self.create_post(post).await
    }

    /// Replaces the text and props of an existing post. Returns the post ID
    /// the server reports.
    #[instrument(skip(self, text, props), fields(post_id = %post_id))]
    pub async fn edit_message(
        &self,
        post_id: &PostId,
        text: &str,
        props: Option<Props>,
    ) -> Result<PostId, GatewayError> {
        let post = Post {
            id: post_id.clone(),
            message: text.to_string(),
            props,
            ..Post::default()
        };
        let updated = self
            .retrier
            .call("UpdatePost", || self.api.update_post(post_id, &post))
            .await?;
        Ok(updated.id)
    }

    #[instrument(skip(self), fields(post_id = %post_id))]
    pub async fn delete_message(&self, post_id: &PostId) -> Result<(), GatewayError> {
        self.retrier
            .call("DeletePost", || self.api.delete_post(post_id))
            .await?;
        Ok(())
    }

    pub async fn send_direct_message(
        &self,
        to: &UserId,
        text: &str,
        root_id: Option<&PostId>,
    ) -> Result<(), GatewayError> {
        self.send_direct_message_props(to, text, root_id, None).await
    }

    /// Sends `text` to the direct channel between the relay user and `to`,
    /// creating the channel on first use.
    #[instrument(skip(self, text, props), fields(to = %to))]
    pub async fn send_direct_message_props(
        &self,
        to: &UserId,
        text: &str,
        root_id: Option<&PostId>,
        props: Option<Props>,
    ) -> Result<(), GatewayError> {
        let channel = self
            .retrier
            .call("CreateDirectChannel", || {
                self.api.create_direct_channel(&self.user_id, to)
            })
            .await
            .inspect_err(|e| debug!(error = %e, "Direct message failed"))?;

        // Failure is logged by the resolver; the created channel's ID stands in.
        let _ = self.resolver.refresh_channels().await;

        let name = self.resolver.direct_channel_name(to, &self.user_id);
        let channel_id = self
            .resolver
            .channel_id_by_name(&name, &self.team_id)
            .unwrap_or(channel.id);

        let post = outbound_post(channel_id, text.replace('\r', ""), root_id, props);
        self.create_post(post).await.map(|_| ())
    }

    /// Uploads one file to a channel. Returns the ID of the stored file.
    #[instrument(skip(self, data), fields(channel_id = %channel_id, bytes = data.len()))]
    pub async fn upload_file(
        &self,
        data: &[u8],
        channel_id: &ChannelId,
        filename: &str,
    ) -> Result<FileId, GatewayError> {
        let response = self.api.upload_file(data, channel_id, filename).await?;
        response
            .file_infos
            .into_iter()
            .next()
            .map(|info| info.id)
            .ok_or_else(|| GatewayError::EmptyUpload {
                filename: filename.to_string(),
            })
    }

    async fn create_post(&self, post: Post) -> Result<PostId, GatewayError> {
        let created = self
            .retrier
            .call("CreatePost", || self.api.create_post(&post))
            .await?;
        Ok(created.id)
    }

    // ─── File links ───

    /// Returns a link per file: the public link when the server issues one,
    /// otherwise the authenticated file URL on this server.
    pub async fn file_links(&self, file_ids: &[FileId]) -> Vec<String> {
        let mut links = Vec::with_capacity(file_ids.len());
        for id in file_ids {
            match self.api.get_file_link(id).await {
                Ok(link) => links.push(link),
                Err(e) => {
                    debug!(file_id = %id, error = %e, "No public link, using file URL");
                    links.push(self.file_url(id));
                }
            }
        }
        links
    }

    /// Returns the public links of the files that have one.
    pub async fn public_links(&self, file_ids: &[FileId]) -> Vec<String> {
        let mut links = Vec::with_capacity(file_ids.len());
        for id in file_ids {
            if let Ok(link) = self.api.get_file_link(id).await {
                links.push(link);
            }
        }
        links
    }

    /// Returns the public link of one file, or an empty string.
    pub async fn public_link(&self, file_id: &FileId) -> String {
        self.api.get_file_link(file_id).await.unwrap_or_default()
    }

    fn file_url(&self, file_id: &FileId) -> String {
        format!(
            "{}://{}{}/files/{}",
            self.scheme, self.server, API_URL_SUFFIX, file_id
        )
    }

    // ─── Reads ───

    /// Searches the configured team. Returns `None` on any error.
    #[instrument(skip(self))]
    pub async fn search_posts(&self, terms: &str) -> Option<PostList> {
        self.api
            .search_posts(&self.team_id, terms, false)
            .await
            .inspect_err(|e| debug!(error = %e, "Search failed"))
            .ok()
    }

    /// Returns the newest `limit` posts of a channel.
    #[instrument(skip(self), fields(channel_id = %channel_id))]
    pub async fn get_posts(&self, channel_id: &ChannelId, limit: u32) -> Option<PostList> {
        self.read("GetPostsForChannel", || {
            self.api.get_posts_for_channel(channel_id, 0, limit)
        })
        .await
    }

    /// Returns the thread containing `post_id`, root first.
    #[instrument(skip(self), fields(post_id = %post_id))]
    pub async fn get_post_thread(&self, post_id: &PostId) -> Option<PostList> {
        let options = ThreadOptions::default();
        self.read("GetPostThread", || self.api.get_post_thread(post_id, &options))
            .await
    }

    /// Returns the posts of a channel created or changed after `since`.
    #[instrument(skip(self), fields(channel_id = %channel_id))]
    pub async fn get_posts_since(
        &self,
        channel_id: &ChannelId,
        since: DateTime<Utc>,
    ) -> Option<PostList> {
        let since = since.timestamp_millis();
        self.read("GetPostsSince", || self.api.get_posts_since(channel_id, since))
            .await
    }

    async fn read<F, Fut>(&self, name: &str, operation: F) -> Option<PostList>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PostList, ApiError>>,
    {
        self.retrier
            .call(name, operation)
            .await
            .inspect_err(|e| warn!(call = name, error = %e, "Read failed"))
            .ok()
    }
}

fn outbound_post(
    channel_id: ChannelId,
    message: String,
    root_id: Option<&PostId>,
    props: Option<Props>,
) -> Post {
    Post {
        channel_id,
        message,
        root_id: root_id.cloned().unwrap_or_default(),
        props,
        ..Post::default()
    }
}
