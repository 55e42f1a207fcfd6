//! `POST /auth/register`, `POST /auth/verify-otp`, `POST /auth/refresh` (§6).

use axum::{
    response::{IntoResponse, Response},
    Extension, Json,
};
use http::{header, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth_external::ExternalError,
    core_context::CoreContext,
    models::UserRecord,
    sessions::SessionError,
};

pub(crate) enum AuthApiError {
    Gateway(ExternalError),
    InvalidOtp,
    Storage(crate::storage::StorageError),
    MissingRefreshToken,
    InvalidRefreshToken,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Gateway(error) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": error.to_string() })),
            ),
            Self::InvalidOtp => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid or expired one-time code" })),
            ),
            Self::Storage(error) => return error.into_response(),
            Self::MissingRefreshToken => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "missing refresh_token cookie" })),
            ),
            Self::InvalidRefreshToken => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid refresh token" })),
            ),
        };
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterPayload {
    #[serde(rename = "phoneNumber")]
    phone_number: String,
}

pub(crate) async fn register(
    Extension(ctx): Extension<CoreContext>,
    Json(payload): Json<RegisterPayload>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    ctx.otp_gateway
        .send_otp(&payload.phone_number)
        .await
        .map_err(AuthApiError::Gateway)?;
    Ok(Json(json!({ "sent": true })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyOtpPayload {
    #[serde(rename = "phoneNumber")]
    phone_number: String,
    otp: String,
    username: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyOtpResponse {
    player: UserRecord,
    #[serde(rename = "accessToken")]
    access_token: String,
}

pub(crate) async fn verify_otp(
    Extension(ctx): Extension<CoreContext>,
    Json(payload): Json<VerifyOtpPayload>,
) -> Result<Response, AuthApiError> {
    let verified = ctx
        .otp_gateway
        .verify_otp(&payload.phone_number, &payload.otp)
        .await
        .map_err(AuthApiError::Gateway)?;
    if !verified {
        return Err(AuthApiError::InvalidOtp);
    }

    let player = ctx
        .user_store
        .find_or_create_by_phone(&payload.phone_number, payload.username)
        .await
        .map_err(crate::storage::StorageError::from)
        .map_err(AuthApiError::Storage)?;

    let access_token = ctx.token_issuer.issue_access_token(&player);
    let refresh_token = ctx.token_issuer.issue_refresh_token(&player);

    let body = Json(VerifyOtpResponse {
        player,
        access_token,
    });
    let cookie = refresh_cookie(&refresh_token);
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshPayload {
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// Accepts the refresh token either from the `refresh_token` cookie or the
/// request body, matching clients that can't rely on cookie jars (native
/// apps) as well as browsers.
pub(crate) async fn refresh(
    Extension(ctx): Extension<CoreContext>,
    headers: http::HeaderMap,
    Json(payload): Json<RefreshPayload>,
) -> Result<Response, AuthApiError> {
    let token = payload
        .refresh_token
        .or_else(|| extract_cookie(&headers, "refresh_token"))
        .ok_or(AuthApiError::MissingRefreshToken)?;

    let claims =
        crate::sessions::parse_token(&token).map_err(|_: SessionError| AuthApiError::InvalidRefreshToken)?;
    let player = ctx
        .user_store
        .find_by_id(&claims.user_id)
        .await
        .ok_or(AuthApiError::InvalidRefreshToken)?;

    let access_token = ctx.token_issuer.issue_access_token(&player);
    let refresh_token = ctx.token_issuer.issue_refresh_token(&player);
    let body = Json(RefreshResponse { access_token });
    let cookie = refresh_cookie(&refresh_token);
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], body).into_response())
}

fn refresh_cookie(token: &str) -> String {
    const MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;
    format!(
        "refresh_token={token}; HttpOnly; Secure; SameSite=None; Path=/; Max-Age={MAX_AGE_SECS}"
    )
}

fn extract_cookie(headers: &http::HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}
