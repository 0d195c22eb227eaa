//! Server-side records exchanged with the REST API and embedded in events.
//!
//! Only the fields the relay reads or writes are modeled; unknown fields are
//! ignored on decode so server upgrades do not break parsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::{ChannelId, FileId, PostId, TeamId, UserId};

/// Free-form post properties (`props` on the wire).
pub type Props = serde_json::Map<String, serde_json::Value>;

/// A post, as decoded from an event payload or returned by the API.
///
/// The same shape is sent when creating or updating a post; empty fields are
/// omitted so the server fills in its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    #[serde(skip_serializing_if = "PostId::is_empty")]
    pub id: PostId,

    #[serde(skip_serializing_if = "is_zero")]
    pub create_at: i64,

    #[serde(skip_serializing_if = "is_zero")]
    pub update_at: i64,

    #[serde(skip_serializing_if = "is_zero")]
    pub delete_at: i64,

    #[serde(skip_serializing_if = "UserId::is_empty")]
    pub user_id: UserId,

    #[serde(skip_serializing_if = "ChannelId::is_empty")]
    pub channel_id: ChannelId,

    /// The thread parent. Empty for top-level posts.
    #[serde(skip_serializing_if = "PostId::is_empty")]
    pub root_id: PostId,

    pub message: String,

    /// System message type (e.g. `system_join_channel`); empty for user posts.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<FileId>>,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Post {
    /// Decodes a post from its serialized JSON form.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Returns true if this post is a reply inside a thread.
    pub fn is_reply(&self) -> bool {
        !self.root_id.is_empty()
    }
}

/// An ordered set of posts as returned by the list, thread and search endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostList {
    /// Post IDs, newest first.
    pub order: Vec<PostId>,

    pub posts: HashMap<PostId, Post>,
}

impl PostList {
    /// Returns the posts in `order`, skipping IDs the server did not include.
    pub fn ordered_posts(&self) -> impl Iterator<Item = &Post> + '_ {
        self.order.iter().filter_map(|id| self.posts.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A user account, as cached by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        User {
            id: id.into(),
            username: username.into(),
            ..User::default()
        }
    }
}

/// A channel record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    pub id: ChannelId,

    /// Empty for direct and group channels, which belong to no team.
    pub team_id: TeamId,

    pub name: String,
    pub display_name: String,

    /// `O` (open), `P` (private), `D` (direct) or `G` (group).
    #[serde(rename = "type")]
    pub kind: String,
}

/// Metadata for an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileInfo {
    pub id: FileId,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
}

/// Response body of the upload endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileUploadResponse {
    pub file_infos: Vec<FileInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ignores_unknown_fields() {
        let raw = r#"{
            "id": "p1",
            "create_at": 1700000000000,
            "user_id": "u1",
            "channel_id": "c1",
            "root_id": "",
            "message": "hello",
            "type": "",
            "props": {"from_bot": "true"},
            "hashtags": "",
            "pending_post_id": ""
        }"#;

        let post = Post::decode(raw).unwrap();
        assert_eq!(post.id, PostId::from("p1"));
        assert_eq!(post.user_id, UserId::from("u1"));
        assert_eq!(post.message, "hello");
        assert!(!post.is_reply());
        assert_eq!(
            post.props.unwrap().get("from_bot"),
            Some(&serde_json::Value::from("true"))
        );
        assert!(post.file_ids.is_none());
    }

    #[test]
    fn decode_rejects_non_json() {
        assert!(Post::decode("not-json").is_err());
    }

    #[test]
    fn outgoing_post_omits_empty_fields() {
        let post = Post {
            channel_id: ChannelId::from("c1"),
            message: "hi".to_string(),
            ..Post::default()
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json, serde_json::json!({"channel_id": "c1", "message": "hi"}));
    }

    #[test]
    fn ordered_posts_follows_order_and_skips_missing() {
        let mut list = PostList::default();
        for id in ["p2", "p1", "p3"] {
            list.order.push(PostId::from(id));
        }
        for id in ["p1", "p2"] {
            list.posts.insert(
                PostId::from(id),
                Post {
                    id: PostId::from(id),
                    ..Post::default()
                },
            );
        }

        let ids: Vec<_> = list.ordered_posts().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(list.len(), 3);
    }
}
