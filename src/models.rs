use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventId(pub String);

impl EventId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scheduled quiz event. Mirrors the `events` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub theme: String,
    pub start_at: DateTime<Utc>,
    pub question_count: usize,
    pub min_players: usize,
    pub lobby_open: bool,
    pub is_started: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub winner: Option<String>,
    pub next_event_created: bool,
}

/// A patch applied via `EventStore::update`. Every field is optional; only
/// `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    pub theme: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub question_count: Option<usize>,
    pub min_players: Option<usize>,
    pub lobby_open: Option<bool>,
    pub is_started: Option<bool>,
    pub is_completed: Option<bool>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub winner: Option<Option<String>>,
    pub next_event_created: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QuestionId(pub String);

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single multiple-choice question. Mirrors the `questions` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub theme: String,
    pub question_text: String,
    pub responses: [String; 4],
    pub correct_response: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered player. Mirrors the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub phone_number: String,
}
