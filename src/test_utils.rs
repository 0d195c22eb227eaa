//! Shared test doubles: a sleeper that records instead of waiting, and a
//! scripted [`ChatApi`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::api::{ApiError, ChatApi, ResponseMeta, ThreadOptions};
use crate::retry::Sleeper;
use crate::types::{
    Channel, ChannelId, FileId, FileInfo, FileUploadResponse, Post, PostId, PostList, TeamId,
    UserId,
};

/// Records every requested backoff and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// A call received by a [`MockApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    CreatePost(Post),
    UpdatePost(PostId, Post),
    DeletePost(PostId),
    GetPostsForChannel {
        channel_id: ChannelId,
        page: u32,
        per_page: u32,
    },
    GetPostThread(PostId, ThreadOptions),
    GetPostsSince(ChannelId, i64),
    SearchPosts {
        team_id: TeamId,
        terms: String,
        is_or_search: bool,
    },
    CreateDirectChannel(UserId, UserId),
    UploadFile {
        channel_id: ChannelId,
        filename: String,
        len: usize,
    },
    GetFileLink(FileId),
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<ApiCall>,
    create_post: VecDeque<Result<Post, ApiError>>,
    update_post: VecDeque<Result<Post, ApiError>>,
    delete_post: VecDeque<Result<(), ApiError>>,
    post_lists: VecDeque<Result<PostList, ApiError>>,
    direct_channel: VecDeque<Result<Channel, ApiError>>,
    upload: VecDeque<Result<FileUploadResponse, ApiError>>,
    file_links: HashMap<FileId, String>,
}

/// A [`ChatApi`] answering from per-operation queues.
///
/// Each call pops the next scripted result for its operation. An empty queue
/// answers with a plausible success: created posts get the ID `new-post`,
/// the direct channel is `dm-channel`, uploads yield file `file-1`. File links
/// come from [`MockApi::link`]; unknown files fail as if public links were
/// disabled.
#[derive(Debug, Default)]
pub struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_create_post(&self, result: Result<Post, ApiError>) -> &Self {
        self.lock().create_post.push_back(result);
        self
    }

    pub fn push_update_post(&self, result: Result<Post, ApiError>) -> &Self {
        self.lock().update_post.push_back(result);
        self
    }

    pub fn push_delete_post(&self, result: Result<(), ApiError>) -> &Self {
        self.lock().delete_post.push_back(result);
        self
    }

    /// Scripts the next list, thread, since or search response.
    pub fn push_post_list(&self, result: Result<PostList, ApiError>) -> &Self {
        self.lock().post_lists.push_back(result);
        self
    }

    pub fn push_direct_channel(&self, result: Result<Channel, ApiError>) -> &Self {
        self.lock().direct_channel.push_back(result);
        self
    }

    pub fn push_upload(&self, result: Result<FileUploadResponse, ApiError>) -> &Self {
        self.lock().upload.push_back(result);
        self
    }

    pub fn link(&self, file_id: &str, url: &str) -> &Self {
        self.lock()
            .file_links
            .insert(FileId::from(file_id), url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: ApiCall) -> MutexGuard<'_, MockState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    fn next_post_list(&self, call: ApiCall) -> Result<PostList, ApiError> {
        self.record(call)
            .post_lists
            .pop_front()
            .unwrap_or_else(|| Ok(PostList::default()))
    }
}

/// A 429 response asking for a one-second wait.
pub fn rate_limited() -> ApiError {
    ApiError::rate_limited(Duration::from_secs(1))
}

pub fn server_error(status: u16, message: &str) -> ApiError {
    ApiError::from_response(ResponseMeta::new(status), message)
}

pub fn post_list(posts: &[(&str, &str)]) -> PostList {
    let mut list = PostList::default();
    for (id, message) in posts {
        let post = Post {
            id: PostId::from(*id),
            message: message.to_string(),
            ..Post::default()
        };
        list.order.push(post.id.clone());
        list.posts.insert(post.id.clone(), post);
    }
    list
}

impl ChatApi for MockApi {
    async fn create_post(&self, post: &Post) -> Result<Post, ApiError> {
        self.record(ApiCall::CreatePost(post.clone()))
            .create_post
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Post {
                    id: PostId::from("new-post"),
                    ..post.clone()
                })
            })
    }

    async fn update_post(&self, post_id: &PostId, post: &Post) -> Result<Post, ApiError> {
        self.record(ApiCall::UpdatePost(post_id.clone(), post.clone()))
            .update_post
            .pop_front()
            .unwrap_or_else(|| Ok(post.clone()))
    }

    async fn delete_post(&self, post_id: &PostId) -> Result<(), ApiError> {
        self.record(ApiCall::DeletePost(post_id.clone()))
            .delete_post
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn get_posts_for_channel(
        &self,
        channel_id: &ChannelId,
        page: u32,
        per_page: u32,
    ) -> Result<PostList, ApiError> {
        self.next_post_list(ApiCall::GetPostsForChannel {
            channel_id: channel_id.clone(),
            page,
            per_page,
        })
    }

    async fn get_post_thread(
        &self,
        post_id: &PostId,
        options: &ThreadOptions,
    ) -> Result<PostList, ApiError> {
        self.next_post_list(ApiCall::GetPostThread(post_id.clone(), options.clone()))
    }

    async fn get_posts_since(&self, channel_id: &ChannelId, since: i64) -> Result<PostList, ApiError> {
        self.next_post_list(ApiCall::GetPostsSince(channel_id.clone(), since))
    }

    async fn search_posts(
        &self,
        team_id: &TeamId,
        terms: &str,
        is_or_search: bool,
    ) -> Result<PostList, ApiError> {
        self.next_post_list(ApiCall::SearchPosts {
            team_id: team_id.clone(),
            terms: terms.to_string(),
            is_or_search,
        })
    }

    async fn create_direct_channel(&self, user_a: &UserId, user_b: &UserId) -> Result<Channel, ApiError> {
        self.record(ApiCall::CreateDirectChannel(user_a.clone(), user_b.clone()))
            .direct_channel
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Channel {
                    id: ChannelId::from("dm-channel"),
                    kind: "D".to_string(),
                    ..Channel::default()
                })
            })
    }

    async fn upload_file(
        &self,
        data: &[u8],
        channel_id: &ChannelId,
        filename: &str,
    ) -> Result<FileUploadResponse, ApiError> {
        self.record(ApiCall::UploadFile {
            channel_id: channel_id.clone(),
            filename: filename.to_string(),
            len: data.len(),
        })
        .upload
        .pop_front()
        .unwrap_or_else(|| {
            Ok(FileUploadResponse {
                file_infos: vec![FileInfo {
                    id: FileId::from("file-1"),
                    name: filename.to_string(),
                    size: data.len() as i64,
                    ..FileInfo::default()
                }],
            })
        })
    }

    async fn get_file_link(&self, file_id: &FileId) -> Result<String, ApiError> {
        self.record(ApiCall::GetFileLink(file_id.clone()))
            .file_links
            .get(file_id)
            .cloned()
            .ok_or_else(|| server_error(501, "Public links have been disabled by the system admin."))
    }
}
