//! User profile types.
//!
//! A [`UserProfile`] captures who the assistant is talking to: identity,
//! communication preferences, interests, and an accumulating familiarity
//! score that drives the derived [`RelationshipStatus`].
//!
//! Profiles are shared between the [`crate::directory::UserDirectory`], any
//! [`crate::events::EventContext`] that points at them, and handlers that
//! captured them, so they travel as [`SharedProfile`]. Persisting profiles is
//! left to callers; the types here are `serde` serialisable for that purpose.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Familiarity assigned to a user on first contact.
pub const DEFAULT_FAMILIARITY: f64 = 0.1;

/// Familiarity gained per interaction of quality 1.0.
pub const FAMILIARITY_STEP: f64 = 0.1;

/// A profile shared by reference between the directory, contexts, and handlers.
pub type SharedProfile = Arc<RwLock<UserProfile>>;

/// Lock a shared profile for reading, recovering from poisoning.
pub fn read_profile(profile: &SharedProfile) -> RwLockReadGuard<'_, UserProfile> {
    profile.read().unwrap_or_else(PoisonError::into_inner)
}

/// Lock a shared profile for writing, recovering from poisoning.
pub fn write_profile(profile: &SharedProfile) -> RwLockWriteGuard<'_, UserProfile> {
    profile.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Relationship tiers
// ---------------------------------------------------------------------------

/// Relationship tier derived from familiarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    #[default]
    Acquaintance,
    Colleague,
    Friend,
    Confidant,
}

impl RelationshipStatus {
    /// Map a familiarity score onto its tier.
    ///
    /// Thresholds: `>= 0.8` confidant, `>= 0.6` friend, `>= 0.3` colleague.
    pub fn from_familiarity(familiarity: f64) -> Self {
        if familiarity >= 0.8 {
            Self::Confidant
        } else if familiarity >= 0.6 {
            Self::Friend
        } else if familiarity >= 0.3 {
            Self::Colleague
        } else {
            Self::Acquaintance
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquaintance => "acquaintance",
            Self::Colleague => "colleague",
            Self::Friend => "friend",
            Self::Confidant => "confidant",
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// How the user likes to be addressed and answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPreferences {
    /// "casual" | "formal" | "technical" | free-form
    pub greeting_style: String,
    /// "12h" | "24h"
    pub time_format: String,
    /// "detailed" | "concise" | "balanced"
    pub response_detail: String,
    /// Anything callers want to stash per user.
    #[serde(default)]
    pub custom_settings: HashMap<String, String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            greeting_style: "casual".into(),
            time_format: "12h".into(),
            response_detail: "detailed".into(),
            custom_settings: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Per-user record keyed by `user_id`.
///
/// Deserialization goes through [`StoredProfile`]: familiarity is clamped to
/// `[0, 1]` and the relationship tier is recomputed from it, so a loaded
/// profile always satisfies the same invariants as one built in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredProfile")]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub first_interaction: DateTime<Utc>,
    familiarity_level: f64,
    interaction_count: u64,
    pub preferences: UserPreferences,
    relationship_status: RelationshipStatus,
    #[serde(default)]
    pub interests: HashSet<String>,
    #[serde(default)]
    pub topic_familiarity: HashMap<String, f64>,
}

/// Wire shape of a persisted profile. The stored tier is accepted but ignored.
#[derive(Deserialize)]
struct StoredProfile {
    user_id: String,
    display_name: String,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    first_interaction: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_familiarity")]
    familiarity_level: f64,
    #[serde(default)]
    interaction_count: u64,
    #[serde(default)]
    preferences: UserPreferences,
    #[serde(default, rename = "relationship_status")]
    _relationship_status: Option<RelationshipStatus>,
    #[serde(default)]
    interests: HashSet<String>,
    #[serde(default)]
    topic_familiarity: HashMap<String, f64>,
}

impl From<StoredProfile> for UserProfile {
    fn from(stored: StoredProfile) -> Self {
        let mut profile = Self {
            user_id: stored.user_id,
            display_name: stored.display_name,
            created_at: stored.created_at,
            last_seen: stored.last_seen,
            first_interaction: stored.first_interaction,
            familiarity_level: DEFAULT_FAMILIARITY,
            interaction_count: stored.interaction_count,
            preferences: stored.preferences,
            relationship_status: RelationshipStatus::default(),
            interests: stored.interests,
            topic_familiarity: stored
                .topic_familiarity
                .into_iter()
                .map(|(topic, level)| (topic, clamp_unit(level)))
                .collect(),
        };
        profile.set_familiarity(stored.familiarity_level);
        profile
    }
}

/// Deserialize a familiarity score, clamping to `[0, 1]`.
///
/// Non-finite or non-numeric values fall back to the new-user default.
fn deserialize_familiarity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer).unwrap_or(DEFAULT_FAMILIARITY);
    if !raw.is_finite() {
        return Ok(DEFAULT_FAMILIARITY);
    }
    Ok(raw.clamp(0.0, 1.0))
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl UserProfile {
    /// Create a profile with new-user defaults.
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let now = Utc::now();
        Self {
            display_name: user_id.clone(),
            user_id,
            created_at: now,
            last_seen: now,
            first_interaction: now,
            familiarity_level: DEFAULT_FAMILIARITY,
            interaction_count: 0,
            preferences: UserPreferences::default(),
            relationship_status: RelationshipStatus::from_familiarity(DEFAULT_FAMILIARITY),
            interests: HashSet::new(),
            topic_familiarity: HashMap::new(),
        }
    }

    /// Wrap the profile for sharing.
    pub fn into_shared(self) -> SharedProfile {
        Arc::new(RwLock::new(self))
    }

    pub fn familiarity_level(&self) -> f64 {
        self.familiarity_level
    }

    pub fn interaction_count(&self) -> u64 {
        self.interaction_count
    }

    pub fn relationship_status(&self) -> RelationshipStatus {
        self.relationship_status
    }

    /// Stamp `last_seen` with the current time.
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Record one interaction of the given quality.
    ///
    /// Familiarity grows by `quality * 0.1` and is clamped to 1.0. Negative
    /// quality counts as zero so familiarity never decreases here.
    pub fn record_interaction(&mut self, quality: f64) {
        let delta = if quality.is_finite() {
            quality.max(0.0) * FAMILIARITY_STEP
        } else {
            0.0
        };
        self.set_familiarity((self.familiarity_level + delta).min(1.0));
        self.interaction_count += 1;
        self.touch();
    }

    /// Explicit reset back to the new-user familiarity.
    pub fn reset_familiarity(&mut self) {
        self.set_familiarity(DEFAULT_FAMILIARITY);
    }

    fn set_familiarity(&mut self, value: f64) {
        self.familiarity_level = value.clamp(0.0, 1.0);
        self.relationship_status = RelationshipStatus::from_familiarity(self.familiarity_level);
    }

    /// Add an interest; returns `false` if it was already present.
    pub fn add_interest(&mut self, interest: impl Into<String>) -> bool {
        self.interests.insert(interest.into())
    }

    /// Adjust familiarity with a topic, clamped to `[0, 1]`.
    pub fn record_topic(&mut self, topic: impl Into<String>, delta: f64) -> f64 {
        let entry = self.topic_familiarity.entry(topic.into()).or_insert(0.0);
        *entry = (*entry + delta).clamp(0.0, 1.0);
        *entry
    }

    pub fn topic_familiarity(&self, topic: &str) -> f64 {
        self.topic_familiarity.get(topic).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_defaults() {
        let profile = UserProfile::new("alice");
        assert_eq!(profile.user_id, "alice");
        assert_eq!(profile.display_name, "alice");
        assert_eq!(profile.familiarity_level(), DEFAULT_FAMILIARITY);
        assert_eq!(profile.interaction_count(), 0);
        assert_eq!(
            profile.relationship_status(),
            RelationshipStatus::Acquaintance
        );
        assert_eq!(profile.preferences.greeting_style, "casual");
        assert_eq!(profile.preferences.time_format, "12h");
        assert_eq!(profile.preferences.response_detail, "detailed");
    }

    #[test]
    fn test_relationship_thresholds() {
        assert_eq!(
            RelationshipStatus::from_familiarity(0.0),
            RelationshipStatus::Acquaintance
        );
        assert_eq!(
            RelationshipStatus::from_familiarity(0.29),
            RelationshipStatus::Acquaintance
        );
        assert_eq!(
            RelationshipStatus::from_familiarity(0.3),
            RelationshipStatus::Colleague
        );
        assert_eq!(
            RelationshipStatus::from_familiarity(0.6),
            RelationshipStatus::Friend
        );
        assert_eq!(
            RelationshipStatus::from_familiarity(0.8),
            RelationshipStatus::Confidant
        );
        assert_eq!(
            RelationshipStatus::from_familiarity(1.0),
            RelationshipStatus::Confidant
        );
    }

    #[test]
    fn test_record_interaction_clamps_at_one() {
        let mut profile = UserProfile::new("bob");
        for _ in 0..10 {
            profile.record_interaction(1.0);
        }
        assert_eq!(profile.familiarity_level(), 1.0);
        assert_eq!(profile.interaction_count(), 10);
        assert_eq!(profile.relationship_status(), RelationshipStatus::Confidant);

        profile.record_interaction(1.0);
        assert_eq!(profile.familiarity_level(), 1.0);
    }

    #[test]
    fn test_negative_quality_never_decreases() {
        let mut profile = UserProfile::new("carol");
        profile.record_interaction(2.0);
        let before = profile.familiarity_level();
        profile.record_interaction(-5.0);
        profile.record_interaction(f64::NAN);
        assert_eq!(profile.familiarity_level(), before);
        assert_eq!(profile.interaction_count(), 3);
    }

    #[test]
    fn test_reset_recomputes_relationship() {
        let mut profile = UserProfile::new("dave");
        for _ in 0..6 {
            profile.record_interaction(1.0);
        }
        assert_eq!(profile.relationship_status(), RelationshipStatus::Friend);
        profile.reset_familiarity();
        assert_eq!(profile.familiarity_level(), DEFAULT_FAMILIARITY);
        assert_eq!(
            profile.relationship_status(),
            RelationshipStatus::Acquaintance
        );
    }

    #[test]
    fn test_topics_and_interests() {
        let mut profile = UserProfile::new("erin");
        assert!(profile.add_interest("rust"));
        assert!(!profile.add_interest("rust"));
        assert_eq!(profile.record_topic("async", 0.7), 0.7);
        assert_eq!(profile.record_topic("async", 0.7), 1.0);
        assert_eq!(profile.record_topic("async", -3.0), 0.0);
        assert_eq!(profile.topic_familiarity("unknown"), 0.0);
    }

    #[test]
    fn test_profile_serialization_roundtrip() {
        let mut profile = UserProfile::new("frank");
        profile.record_interaction(1.0);
        profile.add_interest("chess");
        let json = serde_json::to_string_pretty(&profile).expect("serialize");
        assert!(json.contains("\"relationship_status\": \"acquaintance\""));
        let restored: UserProfile = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.user_id, "frank");
        assert_eq!(restored.familiarity_level(), profile.familiarity_level());
        assert!(restored.interests.contains("chess"));
    }

    #[test]
    fn test_deserialize_clamps_familiarity_and_recomputes_tier() {
        let mut value = serde_json::to_value(UserProfile::new("gina")).expect("serialize");
        value["familiarity_level"] = serde_json::json!(7.5);
        value["relationship_status"] = serde_json::json!("acquaintance");
        value["topic_familiarity"] = serde_json::json!({ "chess": -2.0 });

        let restored: UserProfile = serde_json::from_value(value).expect("deserialize");
        assert_eq!(restored.familiarity_level(), 1.0);
        assert_eq!(restored.relationship_status(), RelationshipStatus::Confidant);
        assert_eq!(restored.topic_familiarity("chess"), 0.0);
    }

    #[test]
    fn test_deserialize_rejects_nonsense_familiarity() {
        let mut value = serde_json::to_value(UserProfile::new("hal")).expect("serialize");
        value["familiarity_level"] = serde_json::json!(-3.0);
        value["relationship_status"] = serde_json::json!("confidant");
        let restored: UserProfile = serde_json::from_value(value.clone()).expect("deserialize");
        assert_eq!(restored.familiarity_level(), 0.0);
        assert_eq!(restored.relationship_status(), RelationshipStatus::Acquaintance);

        value["familiarity_level"] = serde_json::json!("very");
        let restored: UserProfile = serde_json::from_value(value).expect("deserialize");
        assert_eq!(restored.familiarity_level(), DEFAULT_FAMILIARITY);
    }
}
