//! Newtype wrappers for Mattermost identifiers.
//!
//! Every object on a Mattermost server is addressed by an opaque 26-character ID.
//! Wrapping each kind separately stops a `ChannelId` from being passed where a
//! `UserId` is expected, which is otherwise easy to do with bare strings.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                $name(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true for the empty ID, which the server uses to mean "none".
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// A user account ID.
    UserId
);

string_id!(
    /// A channel ID (public, private, group or direct).
    ChannelId
);

string_id!(
    /// A team ID.
    TeamId
);

string_id!(
    /// A post (message) ID.
    PostId
);

string_id!(
    /// An uploaded file's ID.
    FileId
);

/// Returns the canonical name of the direct-message channel between two users.
///
/// The server names DM channels `<lower id>__<higher id>`, so the result does
/// not depend on argument order.
pub fn direct_channel_name(a: &UserId, b: &UserId) -> String {
    if a.0 > b.0 {
        format!("{}__{}", b.0, a.0)
    } else {
        format!("{}__{}", a.0, b.0)
    }
}
