//! `GET/POST /events*` (§6): event CRUD plus the two manual admin triggers
//! (`open-lobby`, `force-lobby-check`) the scheduler otherwise drives on its
//! own intervals.

use axum::{
    extract::Path,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::{
    constants::{DEFAULT_MIN_PLAYERS, DEFAULT_QUESTION_COUNT, LOBBY_OPEN_WINDOW},
    core_context::CoreContext,
    models::{Event, EventId, EventPatch},
    storage::StorageError,
};

pub(crate) enum EventApiError {
    Storage(StorageError),
    NotFound,
}

impl IntoResponse for EventApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Storage(error) => error.into_response(),
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "event not found" }))).into_response()
            }
        }
    }
}

impl From<StorageError> for EventApiError {
    fn from(error: StorageError) -> Self {
        Self::Storage(error)
    }
}

pub(crate) async fn next(Extension(ctx): Extension<CoreContext>) -> Json<Option<Event>> {
    let upcoming = ctx.event_store.find_upcoming_from_now(Utc::now()).await;
    Json(upcoming.into_iter().next())
}

pub(crate) async fn active(Extension(ctx): Extension<CoreContext>) -> Json<Vec<Event>> {
    Json(ctx.event_store.find_active_ordered().await)
}

pub(crate) async fn ready_for_lobby(Extension(ctx): Extension<CoreContext>) -> Json<Vec<Event>> {
    let now = Utc::now();
    let window = ctx
        .event_store
        .find_in_window(now, now + chrono::Duration::from_std(LOBBY_OPEN_WINDOW).unwrap())
        .await;
    Json(window.into_iter().filter(|event| !event.lobby_open).collect())
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateEventPayload {
    theme: String,
    #[serde(rename = "startDate")]
    start_date: chrono::DateTime<Utc>,
    #[serde(rename = "numberOfQuestions")]
    number_of_questions: Option<usize>,
    #[serde(rename = "minPlayers")]
    min_players: Option<usize>,
}

pub(crate) async fn create(
    Extension(ctx): Extension<CoreContext>,
    Json(payload): Json<CreateEventPayload>,
) -> Result<Json<Event>, EventApiError> {
    let event = Event {
        id: EventId::new(),
        theme: payload.theme,
        start_at: payload.start_date,
        question_count: payload.number_of_questions.unwrap_or(DEFAULT_QUESTION_COUNT),
        min_players: payload.min_players.unwrap_or(DEFAULT_MIN_PLAYERS),
        lobby_open: false,
        is_started: false,
        is_completed: false,
        completed_at: None,
        winner: None,
        next_event_created: false,
    };
    ctx.event_store.create(&event).await?;
    Ok(Json(event))
}

pub(crate) async fn update(
    Extension(ctx): Extension<CoreContext>,
    Path(id): Path<String>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<Event>, EventApiError> {
    let id = EventId(id);
    ctx.event_store.update(&id, &patch).await?;
    let updated = ctx.event_store.find_by_id(&id).await.ok_or(EventApiError::NotFound)?;
    ctx.lobby.on_event_updated(updated.clone(), "event updated").await;
    Ok(Json(updated))
}

pub(crate) async fn force_update(
    Extension(ctx): Extension<CoreContext>,
    Path(id): Path<String>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<Event>, EventApiError> {
    update(Extension(ctx), Path(id), Json(patch)).await
}

pub(crate) async fn open_lobby(
    Extension(ctx): Extension<CoreContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, EventApiError> {
    let id = EventId(id);
    let event = ctx.event_store.find_by_id(&id).await.ok_or(EventApiError::NotFound)?;
    ctx.lobby.open_lobby(event).await;
    Ok(Json(json!({ "opened": true })))
}

/// Manual nudge of the lobby-open check outside the scheduler's own
/// interval, for operators who don't want to wait up to 30s.
pub(crate) async fn force_lobby_check(
    Extension(ctx): Extension<CoreContext>,
) -> Json<serde_json::Value> {
    let now = Utc::now();
    let window = ctx
        .event_store
        .find_in_window(now, now + chrono::Duration::from_std(LOBBY_OPEN_WINDOW).unwrap())
        .await;
    let mut opened = 0;
    for event in window.into_iter().filter(|event| !event.lobby_open) {
        ctx.lobby.open_lobby(event).await;
        opened += 1;
    }
    Json(json!({ "opened": opened }))
}
