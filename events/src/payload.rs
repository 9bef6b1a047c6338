use crate::{EventId, EventType};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// A user-facing notification as it is delivered and stored.
///
/// `read` is the only field that changes after creation, and only through
/// explicit mark-as-read calls on the notification store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: EventId,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The caller-supplied part of a notification, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub action_url: Option<String>,
}

impl NewNotification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity: Severity::Info,
            action_url: None,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn action_url(mut self, action_url: impl Into<String>) -> Self {
        self.action_url = Some(action_url.into());
        self
    }

    /// Materializes the notification as unread, sharing the id of the event
    /// that carries it.
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> NotificationEvent {
        NotificationEvent {
            id,
            title: self.title,
            message: self.message,
            severity: self.severity,
            read: false,
            action_url: self.action_url,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioUpdate {
    pub portfolio_id: String,
    pub action: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillProgress {
    pub skill_id: String,
    pub skill_name: String,
    /// Percentage in `0..=100`.
    #[serde(deserialize_with = "percentage")]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

fn percentage<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = u8::deserialize(deserializer)?;
    if value > 100 {
        return Err(de::Error::custom(format!(
            "progress {value} is outside 0..=100"
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapUpdate {
    pub roadmap_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCompleted {
    pub quiz_id: String,
    pub score: u32,
    pub total: u32,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlocked {
    pub achievement_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Event data keyed by [`EventType`]. Serializes as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum EventPayload {
    Activity(Activity),
    Notification(NotificationEvent),
    PortfolioUpdate(PortfolioUpdate),
    SkillProgress(SkillProgress),
    RoadmapUpdate(RoadmapUpdate),
    QuizCompleted(QuizCompleted),
    AchievementUnlocked(AchievementUnlocked),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Activity(_) => EventType::Activity,
            EventPayload::Notification(_) => EventType::Notification,
            EventPayload::PortfolioUpdate(_) => EventType::PortfolioUpdate,
            EventPayload::SkillProgress(_) => EventType::SkillProgress,
            EventPayload::RoadmapUpdate(_) => EventType::RoadmapUpdate,
            EventPayload::QuizCompleted(_) => EventType::QuizCompleted,
            EventPayload::AchievementUnlocked(_) => EventType::AchievementUnlocked,
        }
    }

    /// The `data` half of the wire representation.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        match self {
            EventPayload::Activity(data) => serde_json::to_value(data),
            EventPayload::Notification(data) => serde_json::to_value(data),
            EventPayload::PortfolioUpdate(data) => serde_json::to_value(data),
            EventPayload::SkillProgress(data) => serde_json::to_value(data),
            EventPayload::RoadmapUpdate(data) => serde_json::to_value(data),
            EventPayload::QuizCompleted(data) => serde_json::to_value(data),
            EventPayload::AchievementUnlocked(data) => serde_json::to_value(data),
        }
    }

    /// Rebuilds a payload from its wire halves, validating `data` against the
    /// schema of `event_type`.
    pub fn from_parts(event_type: EventType, data: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json!({ "type": event_type, "data": data }))
    }

    pub fn as_notification(&self) -> Option<&NotificationEvent> {
        match self {
            EventPayload::Notification(notification) => Some(notification),
            _ => None,
        }
    }
}
