//! Turns raw real-time events into [`CanonicalMessage`]s.
//!
//! # Dispatch
//!
//! | Event | Handling |
//! |-------|----------|
//! | `posted`, `post_edited`, `post_deleted` | post normalization, below |
//! | `user_updated` | refresh that user in the directory |
//! | `group_added` | refresh the channel list |
//! | anything else | ignored |
//!
//! # Post Normalization
//!
//! 1. Digest the serialized post into a [`DedupKey`]
//! 2. A repeated digest on anything but a delete returns a suppressed message
//! 3. Decode the post; malformed payloads are dropped
//! 4. Resolve the author; unknown authors are dropped until the directory
//!    catches up
//! 5. Fill in username, channel, user ID and message type
//! 6. Resolve the team, deriving the team ID from the channel when the event
//!    omits it (edits always do) and recording it on the returned envelope
//! 7. Name direct-message channels after the author
//! 8. Attach text and post
//!
//! Deletes share the digest of the post they delete, so they are never
//! suppressed.

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::dedup::{DedupCache, DedupKey};
use crate::directory::{Directory, IdentityResolver};
use crate::types::Post;

use super::message::CanonicalMessage;
use super::raw::{PostAction, PostEvent, RawEvent};

/// Normalizes events from one real-time stream.
///
/// Events are expected in arrival order from a single task; the dedup cache
/// may be shared with other normalizers.
#[derive(Debug)]
pub struct EventNormalizer<D> {
    resolver: IdentityResolver<D>,
    dedup: Arc<DedupCache>,
}

impl<D: Directory> EventNormalizer<D> {
    pub fn new(resolver: IdentityResolver<D>, dedup: Arc<DedupCache>) -> Self {
        EventNormalizer { resolver, dedup }
    }

    pub fn resolver(&self) -> &IdentityResolver<D> {
        &self.resolver
    }

    pub fn dedup(&self) -> &Arc<DedupCache> {
        &self.dedup
    }

    /// Normalizes one event.
    ///
    /// Returns `None` for events that produce no message: non-post kinds,
    /// malformed posts, and posts by users the directory does not know yet.
    /// Returns a message with empty text for duplicate deliveries.
    pub async fn normalize(&self, event: RawEvent) -> Option<CanonicalMessage> {
        match event {
            RawEvent::Post(post_event) => self.normalize_post(post_event),
            RawEvent::UserUpdated(e) => {
                let _ = self.resolver.refresh_user(&e.user.id).await;
                None
            }
            RawEvent::GroupAdded(e) => {
                debug!(channel_id = %e.channel_id, "Added to group channel");
                let _ = self.resolver.refresh_channels().await;
                None
            }
            RawEvent::Unrecognized(e) => {
                trace!(event = %e.event, seq = e.seq, "Ignoring event");
                None
            }
        }
    }

    fn normalize_post(&self, mut event: PostEvent) -> Option<CanonicalMessage> {
        let key = DedupKey::digest(&event.post);
        if self.dedup.seen(&key) && event.action != PostAction::Deleted {
            debug!(key = %key, seq = event.seq, "Post already handled, not processing again");
            return Some(CanonicalMessage::suppressed(RawEvent::Post(event)));
        }

        let post = match Post::decode(&event.post) {
            Ok(post) => post,
            Err(e) => {
                debug!(seq = event.seq, error = %e, "Dropping event with malformed post");
                return None;
            }
        };

        let Some(author) = self.resolver.user_by_id(&post.user_id) else {
            info!(
                user_id = %post.user_id,
                post_id = %post.id,
                "User is not known, ignoring message"
            );
            return None;
        };

        let mut channel = self.resolver.channel_name_by_id(&post.channel_id);

        if event.team_id.is_empty()
            && let Some(team_id) = self.resolver.team_id_by_channel_id(&post.channel_id)
        {
            event.team_id = team_id;
        }
        let team = if event.team_id.is_empty() {
            String::new()
        } else {
            self.resolver.team_name_by_id(&event.team_id)
        };

        if event.is_direct() {
            channel = author.username.clone();
        }

        Some(CanonicalMessage {
            text: post.message.clone(),
            channel,
            team,
            username: self.resolver.user_name_by_id(&post.user_id),
            user_id: post.user_id.clone(),
            message_type: post.kind.clone(),
            post: Some(post),
            raw: RawEvent::Post(event),
        })
    }
}
