#![cfg(test)]

use chrono::Utc;
use clap::Parser;

use crate::{
    models::{Event, EventId, Question, QuestionId, UserId, UserRecord},
    Options,
};

#[must_use]
pub fn test_options() -> Options {
    let args: Vec<&str> = vec!["trivia-realtime-core", "--database-url", "sqlite::memory:"];
    Options::parse_from(args)
}

#[must_use]
pub fn test_event(theme: &str, starts_in_secs: i64) -> Event {
    Event {
        id: EventId::new(),
        theme: theme.to_owned(),
        start_at: Utc::now() + chrono::Duration::seconds(starts_in_secs),
        question_count: 3,
        min_players: 2,
        lobby_open: false,
        is_started: false,
        is_completed: false,
        completed_at: None,
        winner: None,
        next_event_created: false,
    }
}

#[must_use]
pub fn test_question(theme: &str, correct_response: u8) -> Question {
    Question {
        id: QuestionId(uuid::Uuid::new_v4().to_string()),
        theme: theme.to_owned(),
        question_text: "What is 2 + 2?".to_owned(),
        responses: [
            "3".to_owned(),
            "4".to_owned(),
            "5".to_owned(),
            "6".to_owned(),
        ],
        correct_response,
    }
}

#[must_use]
pub fn test_user(username: &str, phone_number: &str) -> UserRecord {
    UserRecord {
        id: UserId(uuid::Uuid::new_v4().to_string()),
        username: username.to_owned(),
        phone_number: phone_number.to_owned(),
    }
}

#[must_use]
pub fn test_token(claims_user: &UserRecord) -> String {
    let payload = serde_json::json!({
        "sub": claims_user.id.0,
        "username": claims_user.username,
        "phoneNumber": claims_user.phone_number,
    });
    let encoded = base64::encode_config(payload.to_string(), base64::URL_SAFE_NO_PAD);
    format!("testheader.{encoded}.testsignature")
}
