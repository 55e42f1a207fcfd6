#![cfg(test)]

mod common;

use common::harness::Harness;
use serde_json::json;

#[tokio::test]
async fn register_then_verify_otp_issues_access_token() {
    let harness = Harness::run().await;
    let client = reqwest::Client::new();

    let register = client
        .post(harness.url("/api/auth/register"))
        .json(&json!({ "phoneNumber": "+15551234567" }))
        .send()
        .await
        .unwrap();
    assert!(register.status().is_success());

    let verified = client
        .post(harness.url("/api/auth/verify-otp"))
        .json(&json!({
            "phoneNumber": "+15551234567",
            "otp": "000000",
            "username": "trivia_fan",
        }))
        .send()
        .await
        .unwrap();
    assert!(verified.status().is_success());
    let body: serde_json::Value = verified.json().await.unwrap();
    assert!(body["accessToken"].as_str().is_some());
    assert_eq!(body["player"]["username"], "trivia_fan");

    harness.stop().await;
}

#[tokio::test]
async fn verify_otp_rejects_wrong_code() {
    let harness = Harness::run().await;
    let client = reqwest::Client::new();

    let response = client
        .post(harness.url("/api/auth/verify-otp"))
        .json(&json!({ "phoneNumber": "+15559876543", "otp": "111111" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    harness.stop().await;
}

#[tokio::test]
async fn event_lifecycle_create_open_lobby_and_fetch_next() {
    let harness = Harness::run().await;
    let client = reqwest::Client::new();

    let start_at = (chrono::Utc::now() + chrono::Duration::seconds(30)).to_rfc3339();
    let created = client
        .post(harness.url("/api/events"))
        .json(&json!({
            "theme": "geography",
            "startDate": start_at,
            "numberOfQuestions": 5,
            "minPlayers": 2,
        }))
        .send()
        .await
        .unwrap();
    assert!(created.status().is_success());
    let event: serde_json::Value = created.json().await.unwrap();
    let event_id = event["id"].as_str().unwrap().to_owned();

    let next = client
        .get(harness.url("/api/events/next"))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(next["id"], event_id);

    let opened = client
        .post(harness.url(&format!("/api/events/{event_id}/open-lobby")))
        .send()
        .await
        .unwrap();
    assert!(opened.status().is_success());

    let ready = client
        .get(harness.url("/api/events/ready-for-lobby"))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    // The event we just opened is no longer "ready" (lobbyOpen is now true).
    assert!(ready
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["id"] != event_id));

    harness.stop().await;
}

#[tokio::test]
async fn question_crud_round_trip() {
    let harness = Harness::run().await;
    let client = reqwest::Client::new();

    let created = client
        .post(harness.url("/api/questions"))
        .json(&json!({
            "theme": "science",
            "questionText": "What planet is closest to the sun?",
            "responses": ["Venus", "Mercury", "Earth", "Mars"],
            "correctResponse": 1,
        }))
        .send()
        .await
        .unwrap();
    assert!(created.status().is_success());
    let question: serde_json::Value = created.json().await.unwrap();
    let question_id = question["id"].as_str().unwrap().to_owned();

    let patched = client
        .patch(harness.url(&format!("/api/questions/{question_id}")))
        .json(&json!({ "theme": "astronomy" }))
        .send()
        .await
        .unwrap();
    assert!(patched.status().is_success());
    let patched_body: serde_json::Value = patched.json().await.unwrap();
    assert_eq!(patched_body["theme"], "astronomy");

    let deleted = client
        .delete(harness.url(&format!("/api/questions/{question_id}")))
        .send()
        .await
        .unwrap();
    assert!(deleted.status().is_success());

    let fetched = client
        .get(harness.url(&format!("/api/questions/{question_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(fetched.status(), reqwest::StatusCode::NOT_FOUND);

    harness.stop().await;
}
