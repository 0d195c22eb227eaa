//! Mattermost Relay - message ingestion and outbound delivery for a chat bridge.
//!
//! This library turns the Mattermost real-time event stream into normalized
//! messages, and sends posts, edits and direct messages back through the REST
//! API without giving up on rate limits.

pub mod api;
pub mod config;
pub mod dedup;
pub mod directory;
pub mod events;
pub mod gateway;
pub mod relay;
pub mod retry;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
