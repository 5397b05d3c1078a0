//! Situational context attached to every event.

use std::collections::HashMap;

use crate::profile::{SharedProfile, read_profile};

/// Metadata key under which a proactive suggestion's text is stored.
pub const SUGGESTION_METADATA_KEY: &str = "suggestion";

/// Snapshot of the situation an event happened in.
///
/// The profile is a shared reference owned by the directory; a context never
/// owns it. Every derived accessor has a fallback so a context without a
/// profile is always safe to read.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub user: Option<SharedProfile>,
    pub session_id: String,
    pub location: String,
    pub emotional_state: String,
    pub metadata: HashMap<String, String>,
    /// 0.0 (idle) to 1.0 (drop everything).
    pub urgency_level: f64,
    pub is_proactive_suggestion: bool,
    pub related_mission: Option<String>,
}

impl Default for EventContext {
    fn default() -> Self {
        Self {
            user: None,
            session_id: "default".into(),
            location: "unknown".into(),
            emotional_state: "neutral".into(),
            metadata: HashMap::new(),
            urgency_level: 0.5,
            is_proactive_suggestion: false,
            related_mission: None,
        }
    }
}

impl EventContext {
    /// Context bound to a user profile.
    pub fn for_user(profile: SharedProfile) -> Self {
        Self {
            user: Some(profile),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_emotional_state(mut self, state: impl Into<String>) -> Self {
        self.emotional_state = state.into();
        self
    }

    /// Urgency is clamped to `[0, 1]`.
    pub fn with_urgency(mut self, urgency: f64) -> Self {
        self.urgency_level = if urgency.is_finite() {
            urgency.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_mission(mut self, mission: impl Into<String>) -> Self {
        self.related_mission = Some(mission.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// User id of the attached profile, or `"unknown"`.
    pub fn user_id(&self) -> String {
        self.user
            .as_ref()
            .map(|p| read_profile(p).user_id.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Familiarity of the attached profile, or 0.
    pub fn familiarity(&self) -> f64 {
        self.user
            .as_ref()
            .map(|p| read_profile(p).familiarity_level())
            .unwrap_or(0.0)
    }

    /// Greeting style of the attached profile, or `"casual"`.
    pub fn greeting_style(&self) -> String {
        self.user
            .as_ref()
            .map(|p| read_profile(p).preferences.greeting_style.clone())
            .unwrap_or_else(|| "casual".to_string())
    }

    /// The suggestion text if this is a proactive context.
    pub fn suggestion(&self) -> Option<&str> {
        self.metadata
            .get(SUGGESTION_METADATA_KEY)
            .map(String::as_str)
    }
}
