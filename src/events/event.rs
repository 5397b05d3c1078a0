//! Event records, payloads, priorities, and the factory that stamps them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::context::EventContext;

/// Type tag of synthetic proactive suggestion events.
pub const SUGGESTION_EVENT_TYPE: &str = "cortana.suggestion";

/// Type tag of emergency events.
pub const EMERGENCY_EVENT_TYPE: &str = "cortana.emergency";

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Event priority. Declaration order is urgency order: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Background,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "background" => Ok(Priority::Background),
            other => Err(format!(
                "unknown priority '{other}' (expected critical, high, normal, low, or background)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Command,
    Question,
    Statement,
    Emotion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStage {
    Started,
    Progress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentKind {
    UserState,
    SystemStatus,
    ExternalThreat,
    Opportunity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningKind {
    UserPreference,
    BehaviorPattern,
    SkillAcquisition,
    RelationshipUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WelcomeKind {
    SystemStartup,
    UserLogin,
    SessionResume,
    ContextChange,
}

/// What happened. Handlers match on the variant; there is no downcasting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    UserRequest {
        content: String,
        kind: RequestKind,
    },
    AiProcessing {
        task_id: String,
        stage: ProcessingStage,
        details: String,
    },
    Environmental {
        kind: EnvironmentKind,
        description: String,
        sensor_data: HashMap<String, f64>,
    },
    Learning {
        kind: LearningKind,
        insight: String,
        /// Clamped to `[0, 1]` by the factory.
        confidence: f64,
    },
    Welcome {
        kind: WelcomeKind,
        message: String,
        target_user_id: String,
    },
}

impl EventPayload {
    /// Type tag used when an event is created without an explicit one.
    pub fn default_event_type(&self) -> &'static str {
        match self {
            EventPayload::UserRequest { .. } => "user.request",
            EventPayload::AiProcessing { .. } => "ai.processing",
            EventPayload::Environmental { .. } => "environment.update",
            EventPayload::Learning { .. } => "learning.insight",
            EventPayload::Welcome { .. } => "cortana.welcome",
        }
    }

    /// Priority used when an event is created without an explicit one.
    pub fn default_priority(&self) -> Priority {
        match self {
            EventPayload::Environmental {
                kind: EnvironmentKind::ExternalThreat,
                ..
            } => Priority::Critical,

            EventPayload::AiProcessing {
                stage: ProcessingStage::Failed,
                ..
            }
            | EventPayload::UserRequest {
                kind: RequestKind::Command | RequestKind::Emotion,
                ..
            } => Priority::High,

            EventPayload::Environmental {
                kind: EnvironmentKind::Opportunity,
                ..
            } => Priority::Low,

            EventPayload::AiProcessing {
                stage: ProcessingStage::Progress,
                ..
            }
            | EventPayload::Learning { .. } => Priority::Background,

            _ => Priority::Normal,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One occurrence. Identity fields are fixed at construction.
#[derive(Debug, Clone)]
pub struct Event {
    event_type: String,
    priority: Priority,
    correlation_id: String,
    created_at: DateTime<Utc>,
    context: Arc<EventContext>,
    payload: EventPayload,
}

impl Event {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn context(&self) -> &Arc<EventContext> {
        &self.context
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn is_critical(&self) -> bool {
        self.priority == Priority::Critical
    }
}

// ---------------------------------------------------------------------------
// Correlation ids
// ---------------------------------------------------------------------------

/// Monotonic correlation-id source owned by a bus (or injected into one).
#[derive(Debug)]
pub struct SequenceGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::with_prefix("evt")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }

    /// Produce the next id, e.g. `evt_0`, `evt_1`, ...
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", self.prefix, n)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds events at the moment of occurrence, stamping correlation id and time.
///
/// Payload helpers pick the payload's default priority unless the factory was
/// derived with [`EventFactory::with_priority`].
#[derive(Debug, Clone)]
pub struct EventFactory {
    sequence: Arc<SequenceGenerator>,
    priority: Option<Priority>,
}

impl EventFactory {
    pub fn new(sequence: Arc<SequenceGenerator>) -> Self {
        Self {
            sequence,
            priority: None,
        }
    }

    /// A factory sharing this one's sequence whose payload helpers stamp
    /// `priority` instead of the payload default.
    pub fn with_priority(&self, priority: Priority) -> Self {
        Self {
            sequence: Arc::clone(&self.sequence),
            priority: Some(priority),
        }
    }

    pub fn sequence(&self) -> &Arc<SequenceGenerator> {
        &self.sequence
    }

    /// Fully explicit constructor.
    pub fn create(
        &self,
        event_type: impl Into<String>,
        priority: Priority,
        payload: EventPayload,
        context: EventContext,
    ) -> Event {
        Event {
            event_type: event_type.into(),
            priority,
            correlation_id: self.sequence.next_id(),
            created_at: Utc::now(),
            context: Arc::new(context),
            payload,
        }
    }

    /// Construct with the payload's default type tag and the override or
    /// default priority.
    pub fn from_payload(&self, payload: EventPayload, context: EventContext) -> Event {
        let event_type = payload.default_event_type();
        let priority = self
            .priority
            .unwrap_or_else(|| payload.default_priority());
        self.create(event_type, priority, payload, context)
    }

    pub fn user_request(
        &self,
        content: impl Into<String>,
        kind: RequestKind,
        context: EventContext,
    ) -> Event {
        self.from_payload(
            EventPayload::UserRequest {
                content: content.into(),
                kind,
            },
            context,
        )
    }

    pub fn ai_processing(
        &self,
        task_id: impl Into<String>,
        stage: ProcessingStage,
        details: impl Into<String>,
        context: EventContext,
    ) -> Event {
        self.from_payload(
            EventPayload::AiProcessing {
                task_id: task_id.into(),
                stage,
                details: details.into(),
            },
            context,
        )
    }

    pub fn environmental(
        &self,
        kind: EnvironmentKind,
        description: impl Into<String>,
        sensor_data: HashMap<String, f64>,
        context: EventContext,
    ) -> Event {
        self.from_payload(
            EventPayload::Environmental {
                kind,
                description: description.into(),
                sensor_data,
            },
            context,
        )
    }

    pub fn learning(
        &self,
        kind: LearningKind,
        insight: impl Into<String>,
        confidence: f64,
        context: EventContext,
    ) -> Event {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.from_payload(
            EventPayload::Learning {
                kind,
                insight: insight.into(),
                confidence,
            },
            context,
        )
    }

    pub fn welcome(
        &self,
        kind: WelcomeKind,
        message: impl Into<String>,
        target_user_id: impl Into<String>,
        context: EventContext,
    ) -> Event {
        self.from_payload(
            EventPayload::Welcome {
                kind,
                message: message.into(),
                target_user_id: target_user_id.into(),
            },
            context,
        )
    }

    /// Synthetic `cortana.suggestion` event carrying the suggestion as an
    /// opportunity.
    pub fn suggestion(
        &self,
        suggestion: impl Into<String>,
        context: EventContext,
        priority: Priority,
    ) -> Event {
        self.create(
            SUGGESTION_EVENT_TYPE,
            priority,
            EventPayload::Environmental {
                kind: EnvironmentKind::Opportunity,
                description: suggestion.into(),
                sensor_data: HashMap::new(),
            },
            context,
        )
    }

    /// Critical `cortana.emergency` event carrying the message as a threat.
    pub fn emergency(&self, message: impl Into<String>, context: EventContext) -> Event {
        self.create(
            EMERGENCY_EVENT_TYPE,
            Priority::Critical,
            EventPayload::Environmental {
                kind: EnvironmentKind::ExternalThreat,
                description: message.into(),
                sensor_data: HashMap::new(),
            },
            context,
        )
    }
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new(Arc::new(SequenceGenerator::new()))
    }
}
