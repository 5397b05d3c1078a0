//! In-memory registry of user profiles.
//!
//! The directory owns the id → profile map; contexts and handlers hold
//! [`SharedProfile`] clones of the same entries. Familiarity updates take the
//! profile's write lock for the whole read-modify-write, so concurrent updates
//! to one user never lose increments.

use std::collections::HashMap;

use chrono::{TimeDelta, Utc};
use tokio::sync::RwLock;

use crate::config::DirectoryConfig;
use crate::events::EventContext;
use crate::profile::{SharedProfile, UserProfile, read_profile, write_profile};

pub struct UserDirectory {
    profiles: RwLock<HashMap<String, SharedProfile>>,
    config: DirectoryConfig,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::with_config(DirectoryConfig::default())
    }

    pub fn with_config(config: DirectoryConfig) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Return the profile for `user_id`, creating a new-user profile on first
    /// contact. Bumps `last_seen` either way.
    pub async fn get_or_create(&self, user_id: &str) -> SharedProfile {
        if let Some(profile) = self.profiles.read().await.get(user_id).cloned() {
            write_profile(&profile).touch();
            return profile;
        }

        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id, "Creating user profile");
                UserProfile::new(user_id).into_shared()
            })
            .clone();
        write_profile(&profile).touch();
        profile
    }

    /// Look up a profile without creating it or touching `last_seen`.
    pub async fn get(&self, user_id: &str) -> Option<SharedProfile> {
        self.profiles.read().await.get(user_id).cloned()
    }

    /// Record an interaction of `quality` (1.0 is a normal, good exchange).
    ///
    /// Creates the profile if needed. Returns the new familiarity.
    pub async fn update_familiarity(&self, user_id: &str, quality: f64) -> f64 {
        let profile = self.get_or_create(user_id).await;
        let mut guard = write_profile(&profile);
        let before = guard.relationship_status();
        guard.record_interaction(quality);
        let after = guard.relationship_status();
        if before != after {
            tracing::info!(
                user_id,
                from = %before,
                to = %after,
                familiarity = guard.familiarity_level(),
                "Relationship tier changed"
            );
        }
        guard.familiarity_level()
    }

    /// Explicitly reset a user's familiarity. Returns `false` for unknown users.
    pub async fn reset_familiarity(&self, user_id: &str) -> bool {
        match self.get(user_id).await {
            Some(profile) => {
                write_profile(&profile).reset_familiarity();
                true
            }
            None => false,
        }
    }

    /// Remove a profile. Idempotent; reports whether one existed.
    pub async fn delete(&self, user_id: &str) -> bool {
        let removed = self.profiles.write().await.remove(user_id).is_some();
        if removed {
            tracing::debug!(user_id, "Deleted user profile");
        }
        removed
    }

    /// Profiles seen within `window` of now.
    pub async fn list_active(&self, window: TimeDelta) -> Vec<SharedProfile> {
        let cutoff = Utc::now() - window;
        self.profiles
            .read()
            .await
            .values()
            .filter(|p| read_profile(p).last_seen >= cutoff)
            .cloned()
            .collect()
    }

    /// Profiles seen within the configured default window (7 days).
    pub async fn list_active_default(&self) -> Vec<SharedProfile> {
        self.list_active(self.config.active_window).await
    }

    /// Fresh event context bound to `user_id`'s profile.
    pub async fn context_for(&self, user_id: &str) -> EventContext {
        EventContext::for_user(self.get_or_create(user_id).await)
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::profile::RelationshipStatus;

    #[tokio::test]
    async fn test_get_or_create_returns_same_profile() {
        let directory = UserDirectory::new();
        let first = directory.get_or_create("alice").await;
        let second = directory.get_or_create("alice").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(directory.len().await, 1);

        let profile = read_profile(&first);
        assert_eq!(profile.familiarity_level(), 0.1);
        assert_eq!(profile.interaction_count(), 0);
        assert_eq!(profile.relationship_status(), RelationshipStatus::Acquaintance);
    }

    #[tokio::test]
    async fn test_get_or_create_bumps_last_seen() {
        let directory = UserDirectory::new();
        let profile = directory.get_or_create("bob").await;
        let stale = Utc::now() - TimeDelta::days(30);
        write_profile(&profile).last_seen = stale;

        directory.get_or_create("bob").await;
        assert!(read_profile(&profile).last_seen > stale);
    }

    #[tokio::test]
    async fn test_update_familiarity_reaches_confidant_and_clamps() {
        let directory = UserDirectory::new();
        let mut last = 0.1;
        for _ in 0..10 {
            let now = directory.update_familiarity("carol", 1.0).await;
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 1.0);

        let profile = directory.get("carol").await.expect("profile exists");
        let profile = read_profile(&profile);
        assert_eq!(profile.interaction_count(), 10);
        assert_eq!(profile.relationship_status(), RelationshipStatus::Confidant);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let directory = UserDirectory::new();
        directory.get_or_create("dave").await;
        assert!(directory.delete("dave").await);
        assert!(!directory.delete("dave").await);
        assert!(directory.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_active_respects_window() {
        let directory = UserDirectory::new();
        directory.get_or_create("recent").await;
        let old = directory.get_or_create("dormant").await;
        write_profile(&old).last_seen = Utc::now() - TimeDelta::days(10);

        let active = directory.list_active_default().await;
        assert_eq!(active.len(), 1);
        assert_eq!(read_profile(&active[0]).user_id, "recent");

        let active = directory.list_active(TimeDelta::days(30)).await;
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_familiarity() {
        let directory = UserDirectory::new();
        assert!(!directory.reset_familiarity("nobody").await);
        for _ in 0..5 {
            directory.update_familiarity("erin", 1.0).await;
        }
        assert!(directory.reset_familiarity("erin").await);
        let profile = directory.get("erin").await.expect("profile exists");
        assert_eq!(read_profile(&profile).familiarity_level(), 0.1);
    }

    #[tokio::test]
    async fn test_context_for_shares_profile() {
        let directory = UserDirectory::new();
        let ctx = directory.context_for("frank").await;
        assert_eq!(ctx.user_id(), "frank");
        directory.update_familiarity("frank", 2.0).await;
        assert!(ctx.familiarity() > 0.29);
    }
}
