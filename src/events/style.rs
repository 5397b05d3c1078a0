//! Response-style selection.
//!
//! Maps an event's priority and context onto the tone a responder should use.
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. playful mood with urgency below 0.3 → `witty`
//! 2. critical priority → `urgent`
//! 3. familiarity at or above 0.7 → `personal_formal` for formal greeters,
//!    otherwise `personal`
//! 4. technical greeting style → `technical`
//! 5. anything else → `professional`

use std::fmt;

use serde::Serialize;

use crate::events::context::EventContext;
use crate::events::event::{Event, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    Witty,
    Urgent,
    PersonalFormal,
    Personal,
    Technical,
    Professional,
}

impl ResponseStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStyle::Witty => "witty",
            ResponseStyle::Urgent => "urgent",
            ResponseStyle::PersonalFormal => "personal_formal",
            ResponseStyle::Personal => "personal",
            ResponseStyle::Technical => "technical",
            ResponseStyle::Professional => "professional",
        }
    }

    /// Style for a published event.
    pub fn for_event(event: &Event) -> Self {
        select_response_style(event.priority(), event.context())
    }
}

impl fmt::Display for ResponseStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn select_response_style(priority: Priority, context: &EventContext) -> ResponseStyle {
    if context.emotional_state == "playful" && context.urgency_level < 0.3 {
        return ResponseStyle::Witty;
    }
    if priority == Priority::Critical {
        return ResponseStyle::Urgent;
    }

    let greeting = context.greeting_style();
    if context.familiarity() >= 0.7 {
        return if greeting == "formal" {
            ResponseStyle::PersonalFormal
        } else {
            ResponseStyle::Personal
        };
    }
    if greeting == "technical" {
        return ResponseStyle::Technical;
    }
    ResponseStyle::Professional
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::UserProfile;

    fn context_with(familiarity_steps: usize, greeting: &str) -> EventContext {
        let mut profile = UserProfile::new("tester");
        profile.preferences.greeting_style = greeting.into();
        for _ in 0..familiarity_steps {
            profile.record_interaction(1.0);
        }
        EventContext::for_user(profile.into_shared())
    }

    #[test]
    fn test_playful_low_urgency_is_witty() {
        let ctx = EventContext::default()
            .with_emotional_state("playful")
            .with_urgency(0.1);
        assert_eq!(
            select_response_style(Priority::Normal, &ctx),
            ResponseStyle::Witty
        );
    }

    #[test]
    fn test_playful_check_precedes_critical() {
        let ctx = EventContext::default()
            .with_emotional_state("playful")
            .with_urgency(0.1);
        assert_eq!(
            select_response_style(Priority::Critical, &ctx),
            ResponseStyle::Witty
        );
    }

    #[test]
    fn test_critical_overrides_playful_once_urgent() {
        let ctx = EventContext::default()
            .with_emotional_state("playful")
            .with_urgency(0.3);
        assert_eq!(
            select_response_style(Priority::Critical, &ctx),
            ResponseStyle::Urgent
        );

        let ctx = context_with(9, "formal");
        assert_eq!(
            select_response_style(Priority::Critical, &ctx),
            ResponseStyle::Urgent
        );
    }

    #[test]
    fn test_high_familiarity_is_personal() {
        // 0.1 + 8 * 0.1 ~= 0.9
        let ctx = context_with(8, "formal");
        assert_eq!(
            select_response_style(Priority::Normal, &ctx),
            ResponseStyle::PersonalFormal
        );

        let ctx = context_with(8, "casual");
        assert_eq!(
            select_response_style(Priority::Normal, &ctx),
            ResponseStyle::Personal
        );

        // Familiarity outranks the technical greeting fallback.
        let ctx = context_with(8, "technical");
        assert_eq!(
            select_response_style(Priority::Low, &ctx),
            ResponseStyle::Personal
        );
    }

    #[test]
    fn test_technical_greeting() {
        let ctx = context_with(0, "technical");
        assert_eq!(
            select_response_style(Priority::Normal, &ctx),
            ResponseStyle::Technical
        );
    }

    #[test]
    fn test_new_user_is_professional() {
        let ctx = EventContext::for_user(UserProfile::new("newbie").into_shared());
        assert_eq!(
            select_response_style(Priority::Normal, &ctx),
            ResponseStyle::Professional
        );
        assert_eq!(
            select_response_style(Priority::Normal, &EventContext::default()),
            ResponseStyle::Professional
        );
    }

    #[test]
    fn test_style_tags() {
        assert_eq!(ResponseStyle::PersonalFormal.to_string(), "personal_formal");
        assert_eq!(ResponseStyle::Witty.as_str(), "witty");
    }
}
