//! WebSocket frame parser.
//!
//! This module parses raw WebSocket JSON frames into typed [`RawEvent`] values.
//!
//! # Parsing Strategy
//!
//! 1. Frames without an `event` field are replies to our own requests
//!    (`{"status": "OK", "seq_reply": n}`); they return `Ok(None)`
//! 2. The event kind selects how `data` is read
//! 3. Unknown kinds become [`RawEvent::Unrecognized`] (not an error)
//! 4. Known kinds with missing or mistyped fields return `Err`

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::types::{TeamId, User};

use super::raw::{
    Broadcast, ChannelType, EVENT_GROUP_ADDED, EVENT_USER_UPDATED, GroupAddedEvent, PostAction,
    PostEvent, RawEvent, UnrecognizedEvent, UserUpdatedEvent,
};

/// Error type for frame parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A required `data` field is missing or has the wrong type.
    #[error("invalid field value for {field} in {event} event")]
    InvalidField {
        event: String,
        field: &'static str,
    },
}

type Data = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: Option<String>,
    #[serde(default)]
    data: Data,
    #[serde(default)]
    broadcast: Broadcast,
    #[serde(default)]
    seq: i64,
    status: Option<String>,
    seq_reply: Option<i64>,
}

/// Parses one WebSocket frame.
///
/// # Returns
///
/// * `Ok(Some(event))` - An event, possibly [`RawEvent::Unrecognized`]
/// * `Ok(None)` - A reply to a client request, not an event
/// * `Err(e)` - Malformed frame or missing required fields
///
/// # Examples
///
/// ```
/// use mattermost_relay::events::{RawEvent, parse_frame};
///
/// let frame = br#"{
///     "event": "posted",
///     "data": {
///         "channel_type": "O",
///         "post": "{\"id\":\"p1\",\"user_id\":\"u1\",\"channel_id\":\"c1\",\"message\":\"hi\"}",
///         "team_id": "t1"
///     },
///     "broadcast": {"channel_id": "c1"},
///     "seq": 4
/// }"#;
///
/// let event = parse_frame(frame).unwrap().unwrap();
/// assert!(matches!(event, RawEvent::Post(_)));
/// ```
pub fn parse_frame(frame: &[u8]) -> Result<Option<RawEvent>, ParseError> {
    let raw: RawFrame = serde_json::from_slice(frame)?;

    let Some(event) = raw.event else {
        debug!(status = ?raw.status, seq_reply = ?raw.seq_reply, "Received response");
        return Ok(None);
    };

    if let Some(action) = PostAction::from_event_str(&event) {
        return parse_post_event(action, &event, raw.data, raw.broadcast, raw.seq)
            .map(|e| Some(RawEvent::Post(e)));
    }

    match event.as_str() {
        EVENT_USER_UPDATED => {
            let user = raw
                .data
                .get("user")
                .cloned()
                .and_then(|v| serde_json::from_value::<User>(v).ok())
                .filter(|u| !u.id.is_empty())
                .ok_or_else(|| ParseError::InvalidField {
                    event: event.clone(),
                    field: "data.user",
                })?;
            Ok(Some(RawEvent::UserUpdated(UserUpdatedEvent {
                user,
                seq: raw.seq,
            })))
        }
        EVENT_GROUP_ADDED => Ok(Some(RawEvent::GroupAdded(GroupAddedEvent {
            channel_id: raw.broadcast.channel_id,
            seq: raw.seq,
        }))),
        _ => Ok(Some(RawEvent::Unrecognized(UnrecognizedEvent {
            event,
            data: raw.data,
            seq: raw.seq,
        }))),
    }
}

fn parse_post_event(
    action: PostAction,
    event: &str,
    data: Data,
    broadcast: Broadcast,
    seq: i64,
) -> Result<PostEvent, ParseError> {
    let invalid = |field| ParseError::InvalidField {
        event: event.to_string(),
        field,
    };

    let post = data
        .get("post")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("data.post"))?
        .to_string();

    let string = |key: &str| {
        data.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let channel_type = data
        .get("channel_type")
        .and_then(|v| v.as_str())
        .map(ChannelType::from_marker);

    Ok(PostEvent {
        action,
        post,
        team_id: TeamId::new(string("team_id")),
        channel_type,
        channel_name: string("channel_name"),
        channel_display_name: string("channel_display_name"),
        sender_name: string("sender_name"),
        broadcast,
        seq,
    })
}
