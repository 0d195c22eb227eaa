//! Typed real-time events.
//!
//! The WebSocket stream delivers envelopes of the form
//! `{"event": "<kind>", "data": {...}, "broadcast": {...}, "seq": n}`. The
//! parser turns each envelope into one variant of [`RawEvent`]. Kinds the relay
//! does not act on are kept as [`RawEvent::Unrecognized`] rather than dropped,
//! so callers can still log or forward them.
//!
//! Post events keep the embedded post exactly as it was serialized: the
//! deduplication digest is computed over those bytes, and decoding into a
//! [`Post`](crate::types::Post) happens in the normalizer.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, TeamId, User, UserId};

/// Wire name of the post-created event.
pub const EVENT_POSTED: &str = "posted";
/// Wire name of the post-edited event.
pub const EVENT_POST_EDITED: &str = "post_edited";
/// Wire name of the post-deleted event.
pub const EVENT_POST_DELETED: &str = "post_deleted";
/// Wire name of the user-updated event.
pub const EVENT_USER_UPDATED: &str = "user_updated";
/// Wire name of the added-to-group-channel event.
pub const EVENT_GROUP_ADDED: &str = "group_added";

/// A parsed real-time event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawEvent {
    /// A post was created, edited or deleted.
    Post(PostEvent),

    /// A user's profile changed.
    UserUpdated(UserUpdatedEvent),

    /// The bot was added to a group channel.
    GroupAdded(GroupAddedEvent),

    /// Any other event kind.
    Unrecognized(UnrecognizedEvent),
}

impl RawEvent {
    /// Returns the wire name of the event kind.
    pub fn event_type(&self) -> &str {
        match self {
            RawEvent::Post(e) => e.action.as_event_str(),
            RawEvent::UserUpdated(_) => EVENT_USER_UPDATED,
            RawEvent::GroupAdded(_) => EVENT_GROUP_ADDED,
            RawEvent::Unrecognized(e) => &e.event,
        }
    }

    /// Returns the transport sequence number.
    pub fn seq(&self) -> i64 {
        match self {
            RawEvent::Post(e) => e.seq,
            RawEvent::UserUpdated(e) => e.seq,
            RawEvent::GroupAdded(e) => e.seq,
            RawEvent::Unrecognized(e) => e.seq,
        }
    }

    pub fn as_post(&self) -> Option<&PostEvent> {
        match self {
            RawEvent::Post(e) => Some(e),
            _ => None,
        }
    }
}

/// What happened to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostAction {
    Created,
    Edited,
    Deleted,
}

impl PostAction {
    /// Maps a wire event name to a post action.
    pub fn from_event_str(event: &str) -> Option<Self> {
        match event {
            EVENT_POSTED => Some(PostAction::Created),
            EVENT_POST_EDITED => Some(PostAction::Edited),
            EVENT_POST_DELETED => Some(PostAction::Deleted),
            _ => None,
        }
    }

    pub fn as_event_str(&self) -> &'static str {
        match self {
            PostAction::Created => EVENT_POSTED,
            PostAction::Edited => EVENT_POST_EDITED,
            PostAction::Deleted => EVENT_POST_DELETED,
        }
    }
}

/// Channel type marker carried by post events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "P")]
    Private,
    #[serde(rename = "D")]
    Direct,
    #[serde(rename = "G")]
    Group,
    #[serde(other)]
    Unknown,
}

impl ChannelType {
    pub fn from_marker(marker: &str) -> Self {
        match marker {
            "O" => ChannelType::Open,
            "P" => ChannelType::Private,
            "D" => ChannelType::Direct,
            "G" => ChannelType::Group,
            _ => ChannelType::Unknown,
        }
    }
}

/// Delivery scope of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Broadcast {
    pub channel_id: ChannelId,
    pub team_id: TeamId,
    pub user_id: UserId,
}

/// A `posted`, `post_edited` or `post_deleted` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEvent {
    pub action: PostAction,

    /// The post, serialized as JSON, byte for byte as delivered.
    pub post: String,

    /// The team the post belongs to.
    ///
    /// Empty for `post_edited` events, which omit it, and for direct and group
    /// channels, which belong to no team.
    pub team_id: TeamId,

    pub channel_type: Option<ChannelType>,

    pub channel_name: String,

    pub channel_display_name: String,

    /// `@username` of the author, as rendered by the server.
    pub sender_name: String,

    pub broadcast: Broadcast,

    pub seq: i64,
}

impl PostEvent {
    /// Creates an event with only the fields the normalizer needs.
    pub fn new(action: PostAction, post: impl Into<String>) -> Self {
        PostEvent {
            action,
            post: post.into(),
            team_id: TeamId::default(),
            channel_type: None,
            channel_name: String::new(),
            channel_display_name: String::new(),
            sender_name: String::new(),
            broadcast: Broadcast::default(),
            seq: 0,
        }
    }

    pub fn with_team_id(mut self, team_id: impl Into<TeamId>) -> Self {
        self.team_id = team_id.into();
        self
    }

    pub fn with_channel_type(mut self, channel_type: ChannelType) -> Self {
        self.channel_type = Some(channel_type);
        self
    }

    pub fn is_direct(&self) -> bool {
        self.channel_type == Some(ChannelType::Direct)
    }
}

/// A `user_updated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdatedEvent {
    pub user: User,
    pub seq: i64,
}

/// A `group_added` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAddedEvent {
    pub channel_id: ChannelId,
    pub seq: i64,
}

/// An event of a kind the relay does not handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrecognizedEvent {
    pub event: String,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub seq: i64,
}
