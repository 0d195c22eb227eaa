//! Identity lookups against the user/channel/team directory.
//!
//! Real-time events carry raw IDs only. Names come from a [`Directory`]: a
//! cache the embedding application keeps populated from the server. The cache
//! may lag reality; a user who just joined can post before their profile is
//! cached, and lookups must fail soft in that case.
//!
//! [`IdentityResolver`] is the facade the normalizer and gateway use. It turns
//! the directory's empty-string conventions into `Option`s and logs failed
//! refreshes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::types::{Channel, ChannelId, TeamId, User, UserId, direct_channel_name};

/// Errors from directory refreshes.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Fetching fresh records from the server failed.
    #[error("failed to refresh {what}: {source}")]
    Api {
        what: &'static str,
        #[source]
        source: ApiError,
    },

    /// The directory could not apply the refresh.
    #[error("failed to refresh {what}: {message}")]
    Refresh { what: &'static str, message: String },
}

/// A cache of users, channels and teams.
///
/// Lookups are synchronous reads of the cache. Refreshes reload from the
/// server and may be slow. Implementations provide their own synchronization.
pub trait Directory: Send + Sync {
    fn user(&self, id: &UserId) -> Option<User>;

    /// Returns the username, or an empty string if the user is unknown.
    fn user_name(&self, id: &UserId) -> String;

    /// Returns the channel name, or an empty string if the channel is unknown.
    fn channel_name(&self, id: &ChannelId) -> String;

    /// Returns the owning team, or an empty ID for unknown or team-less channels.
    fn channel_team_id(&self, id: &ChannelId) -> TeamId;

    /// Returns the team name, or an empty string if the team is unknown.
    fn team_name(&self, id: &TeamId) -> String;

    /// Looks up a channel by name. Direct channels match in any team.
    fn channel_id(&self, name: &str, team_id: &TeamId) -> Option<ChannelId>;

    fn update_user(&self, id: &UserId) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    fn update_users(&self) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    fn update_channels(&self) -> impl Future<Output = Result<(), DirectoryError>> + Send;
}

/// Soft-failing facade over a [`Directory`].
#[derive(Debug)]
pub struct IdentityResolver<D> {
    directory: Arc<D>,
}

impl<D> Clone for IdentityResolver<D> {
    fn clone(&self) -> Self {
        IdentityResolver {
            directory: self.directory.clone(),
        }
    }
}

impl<D: Directory> IdentityResolver<D> {
    pub fn new(directory: Arc<D>) -> Self {
        IdentityResolver { directory }
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    /// Returns the user, or `None` if the directory does not know them yet.
    pub fn user_by_id(&self, id: &UserId) -> Option<User> {
        self.directory.user(id)
    }

    pub fn user_name_by_id(&self, id: &UserId) -> String {
        self.directory.user_name(id)
    }

    pub fn channel_name_by_id(&self, id: &ChannelId) -> String {
        self.directory.channel_name(id)
    }

    pub fn team_id_by_channel_id(&self, id: &ChannelId) -> Option<TeamId> {
        Some(self.directory.channel_team_id(id)).filter(|t| !t.is_empty())
    }

    pub fn team_name_by_id(&self, id: &TeamId) -> String {
        self.directory.team_name(id)
    }

    pub fn channel_id_by_name(&self, name: &str, team_id: &TeamId) -> Option<ChannelId> {
        self.directory.channel_id(name, team_id)
    }

    pub fn direct_channel_name(&self, a: &UserId, b: &UserId) -> String {
        direct_channel_name(a, b)
    }

    pub async fn refresh_user(&self, id: &UserId) -> Result<(), DirectoryError> {
        debug!(user_id = %id, "Refreshing user");
        self.directory
            .update_user(id)
            .await
            .inspect_err(|e| warn!(user_id = %id, error = %e, "Failed to update user"))
    }

    pub async fn refresh_users(&self) -> Result<(), DirectoryError> {
        self.directory
            .update_users()
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to update users"))
    }

    pub async fn refresh_channels(&self) -> Result<(), DirectoryError> {
        self.directory
            .update_channels()
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to update channels"))
    }
}

// ─── In-memory directory ───

/// A refresh requested from an [`InMemoryDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    User(UserId),
    Users,
    Channels,
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<UserId, User>,
    channels: HashMap<ChannelId, Channel>,
    teams: HashMap<TeamId, String>,
    refreshes: Vec<Refresh>,
    refresh_error: Option<String>,
}

/// A [`Directory`] held entirely in memory.
///
/// Records are inserted by the owner. Refreshes have nothing to reload; they
/// are recorded and succeed, or fail with the configured refresh error.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.write().users.insert(user.id.clone(), user);
    }

    pub fn insert_channel(&self, channel: Channel) {
        self.write().channels.insert(channel.id.clone(), channel);
    }

    pub fn insert_team(&self, id: impl Into<TeamId>, name: impl Into<String>) {
        self.write().teams.insert(id.into(), name.into());
    }

    pub fn remove_user(&self, id: &UserId) {
        self.write().users.remove(id);
    }

    /// Makes every later refresh fail with `message`, or succeed with `None`.
    pub fn set_refresh_error(&self, message: Option<String>) {
        self.write().refresh_error = message;
    }

    /// Returns the refreshes requested so far, oldest first.
    pub fn refreshes(&self) -> Vec<Refresh> {
        self.read().refreshes.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectoryState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DirectoryState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, refresh: Refresh, what: &'static str) -> Result<(), DirectoryError> {
        let mut state = self.write();
        state.refreshes.push(refresh);
        match &state.refresh_error {
            Some(message) => Err(DirectoryError::Refresh {
                what,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Directory for InMemoryDirectory {
    fn user(&self, id: &UserId) -> Option<User> {
        self.read().users.get(id).cloned()
    }

    fn user_name(&self, id: &UserId) -> String {
        self.read()
            .users
            .get(id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn channel_name(&self, id: &ChannelId) -> String {
        self.read()
            .channels
            .get(id)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn channel_team_id(&self, id: &ChannelId) -> TeamId {
        self.read()
            .channels
            .get(id)
            .map(|c| c.team_id.clone())
            .unwrap_or_default()
    }

    fn team_name(&self, id: &TeamId) -> String {
        self.read().teams.get(id).cloned().unwrap_or_default()
    }

    fn channel_id(&self, name: &str, team_id: &TeamId) -> Option<ChannelId> {
        self.read()
            .channels
            .values()
            .find(|c| c.name == name && (c.team_id == *team_id || c.team_id.is_empty()))
            .map(|c| c.id.clone())
    }

    async fn update_user(&self, id: &UserId) -> Result<(), DirectoryError> {
        self.record(Refresh::User(id.clone()), "user")
    }

    async fn update_users(&self) -> Result<(), DirectoryError> {
        self.record(Refresh::Users, "users")
    }

    async fn update_channels(&self) -> Result<(), DirectoryError> {
        self.record(Refresh::Channels, "channels")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> IdentityResolver<InMemoryDirectory> {
        let directory = InMemoryDirectory::new();
        directory.insert_user(User::new("u1", "alice"));
        directory.insert_team("t1", "engineering");
        directory.insert_channel(Channel {
            id: ChannelId::from("c1"),
            team_id: TeamId::from("t1"),
            name: "town-square".to_string(),
            display_name: "Town Square".to_string(),
            kind: "O".to_string(),
        });
        directory.insert_channel(Channel {
            id: ChannelId::from("dm1"),
            name: "u1__u2".to_string(),
            kind: "D".to_string(),
            ..Channel::default()
        });
        IdentityResolver::new(Arc::new(directory))
    }

    #[test]
    fn known_ids_resolve() {
        let r = resolver();
        assert_eq!(r.user_by_id(&UserId::from("u1")).unwrap().username, "alice");
        assert_eq!(r.user_name_by_id(&UserId::from("u1")), "alice");
        assert_eq!(r.channel_name_by_id(&ChannelId::from("c1")), "town-square");
        assert_eq!(
            r.team_id_by_channel_id(&ChannelId::from("c1")),
            Some(TeamId::from("t1"))
        );
        assert_eq!(r.team_name_by_id(&TeamId::from("t1")), "engineering");
    }

    #[test]
    fn unknown_ids_fail_soft() {
        let r = resolver();
        assert!(r.user_by_id(&UserId::from("nobody")).is_none());
        assert_eq!(r.user_name_by_id(&UserId::from("nobody")), "");
        assert_eq!(r.channel_name_by_id(&ChannelId::from("nowhere")), "");
        assert_eq!(r.team_id_by_channel_id(&ChannelId::from("nowhere")), None);
        assert_eq!(r.team_name_by_id(&TeamId::from("t9")), "");
    }

    #[test]
    fn direct_channels_have_no_team() {
        let r = resolver();
        assert_eq!(r.team_id_by_channel_id(&ChannelId::from("dm1")), None);
    }

    #[test]
    fn channel_id_by_name_matches_team_or_teamless() {
        let r = resolver();
        let team = TeamId::from("t1");
        assert_eq!(
            r.channel_id_by_name("town-square", &team),
            Some(ChannelId::from("c1"))
        );
        assert_eq!(
            r.channel_id_by_name(&r.direct_channel_name(&UserId::from("u2"), &UserId::from("u1")), &team),
            Some(ChannelId::from("dm1"))
        );
        assert_eq!(r.channel_id_by_name("town-square", &TeamId::from("t2")), None);
    }

    #[tokio::test]
    async fn refreshes_are_recorded_and_can_fail() {
        let r = resolver();
        r.refresh_user(&UserId::from("u1")).await.unwrap();
        r.refresh_channels().await.unwrap();

        r.directory().set_refresh_error(Some("server unreachable".to_string()));
        let err = r.refresh_users().await.unwrap_err();
        assert_eq!(err.to_string(), "failed to refresh users: server unreachable");

        assert_eq!(
            r.directory().refreshes(),
            vec![
                Refresh::User(UserId::from("u1")),
                Refresh::Channels,
                Refresh::Users
            ]
        );
    }
}
