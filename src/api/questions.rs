//! `/questions*` CRUD and sampling endpoints (§6).

use axum::{
    extract::Path,
    response::{IntoResponse, Response},
    Extension, Json,
};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::{
    core_context::CoreContext,
    models::{Question, QuestionId},
    storage::StorageError,
};

pub(crate) enum QuestionApiError {
    Storage(StorageError),
    NotFound,
}

impl IntoResponse for QuestionApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Storage(error) => error.into_response(),
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "question not found" }))).into_response()
            }
        }
    }
}

impl From<StorageError> for QuestionApiError {
    fn from(error: StorageError) -> Self {
        Self::Storage(error)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionPayload {
    theme: String,
    #[serde(rename = "questionText")]
    question_text: String,
    responses: [String; 4],
    #[serde(rename = "correctResponse")]
    correct_response: u8,
}

pub(crate) async fn create(
    Extension(ctx): Extension<CoreContext>,
    Json(payload): Json<QuestionPayload>,
) -> Result<Json<Question>, QuestionApiError> {
    let question = Question {
        id: QuestionId(uuid::Uuid::new_v4().to_string()),
        theme: payload.theme,
        question_text: payload.question_text,
        responses: payload.responses,
        correct_response: payload.correct_response,
    };
    ctx.question_store.create(&question).await?;
    Ok(Json(question))
}

pub(crate) async fn list(Extension(ctx): Extension<CoreContext>) -> Json<Vec<Question>> {
    Json(ctx.question_store.find_all().await)
}

pub(crate) async fn random(
    Extension(ctx): Extension<CoreContext>,
    Path(limit): Path<usize>,
) -> Json<Vec<Question>> {
    Json(ctx.question_store.sample_any(limit).await)
}

pub(crate) async fn by_theme(
    Extension(ctx): Extension<CoreContext>,
    Path(theme): Path<String>,
) -> Json<Vec<Question>> {
    Json(ctx.question_store.find_by_theme(&theme).await)
}

pub(crate) async fn get_one(
    Extension(ctx): Extension<CoreContext>,
    Path(id): Path<String>,
) -> Result<Json<Question>, QuestionApiError> {
    let question = ctx
        .question_store
        .find_by_id(&QuestionId(id))
        .await
        .ok_or(QuestionApiError::NotFound)?;
    Ok(Json(question))
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionPatchPayload {
    theme: Option<String>,
    #[serde(rename = "questionText")]
    question_text: Option<String>,
    responses: Option<[String; 4]>,
    #[serde(rename = "correctResponse")]
    correct_response: Option<u8>,
}

pub(crate) async fn update(
    Extension(ctx): Extension<CoreContext>,
    Path(id): Path<String>,
    Json(patch): Json<QuestionPatchPayload>,
) -> Result<Json<Question>, QuestionApiError> {
    let id = QuestionId(id);
    let mut question = ctx
        .question_store
        .find_by_id(&id)
        .await
        .ok_or(QuestionApiError::NotFound)?;
    if let Some(theme) = patch.theme {
        question.theme = theme;
    }
    if let Some(question_text) = patch.question_text {
        question.question_text = question_text;
    }
    if let Some(responses) = patch.responses {
        question.responses = responses;
    }
    if let Some(correct_response) = patch.correct_response {
        question.correct_response = correct_response;
    }
    ctx.question_store.update(&question).await?;
    Ok(Json(question))
}

pub(crate) async fn delete(
    Extension(ctx): Extension<CoreContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, QuestionApiError> {
    ctx.question_store.delete(&QuestionId(id)).await?;
    Ok(Json(json!({ "deleted": true })))
}
