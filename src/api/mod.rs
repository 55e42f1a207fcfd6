//! HTTP surface (§6): the management/auth plane that sits alongside the
//! realtime transport. Grounded on the teacher's `api::v1` layout — one
//! module per resource, each owning its request/response types and its own
//! error enum mapped to a status code.

pub mod auth;
pub mod events;
pub mod questions;

use axum::{routing::{get, post, put}, Router};

pub fn router() -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-otp", post(auth::verify_otp))
        .route("/auth/refresh", post(auth::refresh))
        .route("/events/next", get(events::next))
        .route("/events/active", get(events::active))
        .route("/events/ready-for-lobby", get(events::ready_for_lobby))
        .route("/events/force-lobby-check", post(events::force_lobby_check))
        .route("/events", post(events::create))
        .route("/events/:id", put(events::update))
        .route("/events/:id/open-lobby", post(events::open_lobby))
        .route("/events/:id/force-update", post(events::force_update))
        .route("/questions", post(questions::create).get(questions::list))
        .route("/questions/random/:limit", get(questions::random))
        .route("/questions/theme/:theme", get(questions::by_theme))
        .route(
            "/questions/:id",
            get(questions::get_one)
                .patch(questions::update)
                .delete(questions::delete),
        )
}
