//! Real-time event handling.
//!
//! This module provides:
//! - Typed representations of WebSocket event envelopes ([`RawEvent`])
//! - A frame parser ([`parse_frame`])
//! - The normalizer that produces [`CanonicalMessage`]s

pub mod message;
pub mod normalizer;
pub mod parser;
pub mod raw;

pub use message::CanonicalMessage;
pub use normalizer::EventNormalizer;
pub use parser::{ParseError, parse_frame};
pub use raw::{
    Broadcast, ChannelType, GroupAddedEvent, PostAction, PostEvent, RawEvent, UnrecognizedEvent,
    UserUpdatedEvent,
};
