use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of event kinds delivered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Activity,
    Notification,
    PortfolioUpdate,
    SkillProgress,
    RoadmapUpdate,
    QuizCompleted,
    AchievementUnlocked,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::Activity,
        EventType::Notification,
        EventType::PortfolioUpdate,
        EventType::SkillProgress,
        EventType::RoadmapUpdate,
        EventType::QuizCompleted,
        EventType::AchievementUnlocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Activity => "activity",
            EventType::Notification => "notification",
            EventType::PortfolioUpdate => "portfolio-update",
            EventType::SkillProgress => "skill-progress",
            EventType::RoadmapUpdate => "roadmap-update",
            EventType::QuizCompleted => "quiz-completed",
            EventType::AchievementUnlocked => "achievement-unlocked",
        }
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// A subscription filter over [`EventType`]s.
///
/// An empty set matches every type, so a client that asks for nothing in
/// particular receives everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventTypeSet(u8);

impl EventTypeSet {
    pub fn all() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, event_type: EventType) {
        self.0 |= event_type.bit();
    }

    pub fn is_unfiltered(&self) -> bool {
        self.0 == 0
    }

    pub fn matches(&self, event_type: EventType) -> bool {
        self.is_unfiltered() || self.0 & event_type.bit() != 0
    }

    /// The concrete types this set admits, in declaration order.
    pub fn types(&self) -> Vec<EventType> {
        EventType::ALL
            .into_iter()
            .filter(|t| self.matches(*t))
            .collect()
    }

    /// Parses a comma separated list such as `notification,quiz-completed`.
    /// Blank segments are ignored.
    pub fn parse_list(list: &str) -> Result<Self, UnknownEventType> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(EventType::from_str)
            .collect()
    }
}

impl FromIterator<EventType> for EventTypeSet {
    fn from_iter<I: IntoIterator<Item = EventType>>(iter: I) -> Self {
        let mut set = EventTypeSet::default();
        for event_type in iter {
            set.insert(event_type);
        }
        set
    }
}
