//! The normalized message record handed to the bridge.

use serde::{Deserialize, Serialize};

use crate::types::{Post, UserId};

use super::raw::RawEvent;

/// A post event with its identities resolved.
///
/// An empty `text` means "do not relay": the event was a duplicate delivery.
/// Callers must check the text, not only the event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub text: String,

    /// Channel name, or the author's username for direct messages.
    pub channel: String,

    /// Team name; empty when the post belongs to no team.
    pub team: String,

    pub username: String,

    pub user_id: UserId,

    /// The post's system message type; empty for ordinary user posts.
    pub message_type: String,

    pub post: Option<Post>,

    /// The event this message was built from, with any team ID the
    /// normalizer derived filled in.
    pub raw: RawEvent,
}

impl CanonicalMessage {
    /// A message that tells the caller the event was already handled.
    pub fn suppressed(raw: RawEvent) -> Self {
        CanonicalMessage {
            text: String::new(),
            channel: String::new(),
            team: String::new(),
            username: String::new(),
            user_id: UserId::default(),
            message_type: String::new(),
            post: None,
            raw,
        }
    }

    /// Whether this is a duplicate-delivery marker. A resolved post with no
    /// text (an attachment-only post) still carries its `post`.
    pub fn is_suppressed(&self) -> bool {
        self.text.is_empty() && self.post.is_none()
    }

    pub fn event_type(&self) -> &str {
        self.raw.event_type()
    }
}
