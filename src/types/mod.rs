//! Core domain types: identifiers and the server records built from them.

pub mod ids;
pub mod post;

pub use ids::{ChannelId, FileId, PostId, TeamId, UserId, direct_channel_name};
pub use post::{Channel, FileInfo, FileUploadResponse, Post, PostList, Props, User};
