//! Transport Bindings (C10): the WebSocket upgrade handler and per-connection
//! ingress dispatch. Handlers only decode and forward — the match arms below
//! call straight into C5/C6/C7/C8; no business logic lives here, mirroring
//! how the teacher's Axum handlers are thin extractors over core logic.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    context::{check_auth_gate, ClientContext, ContextError, Mode},
    core_context::CoreContext,
    sessions::{ConnectionId, ParticipationMode},
    transport::messages::{
        ClientMessage, ConnectionStatusPayload, EventSummary, ServerMessage,
    },
    wire_error::ToWireError,
};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(ctx): Extension<CoreContext>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: CoreContext) {
    let connection_id = ConnectionId::new();
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    ctx.sessions.on_connect(connection_id.clone(), tx).await;
    send_initial_snapshot(&ctx, &connection_id).await;

    let forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_stream.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(client_message) => dispatch(&ctx, &connection_id, client_message).await,
            Err(error) => {
                debug!(%error, %connection_id, "failed to parse inbound message");
                ctx.hub
                    .emit_to(
                        &connection_id,
                        ServerMessage::error(
                            ContextError::InvalidContextPayload.to_wire_error(),
                        ),
                    )
                    .await;
            }
        }
    }

    on_disconnect(&ctx, &connection_id).await;
    forward_task.abort();
}

async fn send_initial_snapshot(ctx: &CoreContext, connection_id: &ConnectionId) {
    ctx.hub
        .emit_to(
            connection_id,
            ServerMessage::connectionStatus(ConnectionStatusPayload { connected: true }),
        )
        .await;
    ctx.hub
        .emit_to(connection_id, ServerMessage::userStats(user_stats(ctx, connection_id).await))
        .await;
    ctx.hub
        .emit_to(connection_id, ServerMessage::lobbyStatus(lobby_status(ctx).await))
        .await;
    if let Some(next) = ctx
        .event_store
        .find_upcoming_from_now(chrono::Utc::now())
        .await
        .into_iter()
        .next()
    {
        ctx.hub
            .emit_to(
                connection_id,
                ServerMessage::nextEvent(Some(EventSummary {
                    id: next.id,
                    theme: next.theme,
                    start_at: next.start_at,
                })),
            )
            .await;
    } else {
        ctx.hub
            .emit_to(connection_id, ServerMessage::nextEvent(None))
            .await;
    }
}

/// Identity snapshot for the connection: null fields for an unauthenticated
/// or not-yet-registered session.
async fn user_stats(ctx: &CoreContext, connection_id: &ConnectionId) -> serde_json::Value {
    let session = ctx.sessions.get(connection_id).await;
    let user = match session.as_ref().and_then(|s| s.user_id.clone()) {
        Some(user_id) => ctx.user_store.find_by_id(&user_id).await,
        None => None,
    };
    match user {
        Some(user) => serde_json::json!({
            "id": user.id.0,
            "username": user.username,
        }),
        None => serde_json::json!({ "id": null, "username": null }),
    }
}

async fn lobby_status(ctx: &CoreContext) -> crate::transport::messages::LobbyStatusPayload {
    crate::transport::messages::LobbyStatusPayload {
        open: ctx.lobby.has_open_lobby().await,
        participants: 0,
    }
}

async fn dispatch(ctx: &CoreContext, connection_id: &ConnectionId, message: ClientMessage) {
    ctx.sessions.record_activity(connection_id).await;
    match message {
        ClientMessage::Authenticate { token } => handle_authenticate(ctx, connection_id, &token).await,
        ClientMessage::SetContext { mode, flags } => {
            handle_set_context(ctx, connection_id, mode, flags).await;
        }
        ClientMessage::JoinLobby => ctx.lobby.join(connection_id.clone()).await,
        ClientMessage::LeaveLobby => ctx.lobby.leave(connection_id).await,
        ClientMessage::JoinInProgress => {
            if ctx.quiz.join_in_progress(connection_id.clone()).await {
                ctx.sessions
                    .set_participation_mode(connection_id, ParticipationMode::Watch)
                    .await;
            }
        }
        ClientMessage::SubmitAnswer {
            question_id,
            answer,
        } => handle_submit_answer(ctx, connection_id, &question_id, answer).await,
        ClientMessage::StartSoloQuiz { theme } => handle_solo_quiz(ctx, connection_id, theme).await,
        ClientMessage::CheckEvents => {
            // Admin re-scan: a no-op here since the scheduler loops already
            // poll on their own interval; this message exists for manual
            // operational nudging.
            debug!(%connection_id, "checkEvents requested");
        }
        ClientMessage::HeartbeatAck => {
            ctx.sessions.record_activity(connection_id).await;
        }
    }
}

async fn handle_authenticate(ctx: &CoreContext, connection_id: &ConnectionId, token: &str) {
    match ctx.sessions.authenticate(connection_id, token).await {
        Ok(outcome) => {
            use crate::sessions::AuthenticateOutcome;
            if let AuthenticateOutcome::DisplacedPrevious(previous) = outcome {
                ctx.hub
                    .emit_to(
                        &previous,
                        ServerMessage::forceLogout(crate::transport::messages::ForceLogoutPayload {
                            reason: "Nouvelle connexion détectée".to_owned(),
                        }),
                    )
                    .await;
                let hub = ctx.hub.clone();
                let sessions = ctx.sessions.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(crate::constants::FORCE_LOGOUT_GRACE).await;
                    sessions.on_disconnect(&previous).await;
                    let _ = hub;
                });
            }
            ctx.hub
                .emit_to(
                    connection_id,
                    ServerMessage::connectionStatus(ConnectionStatusPayload { connected: true }),
                )
                .await;
            send_initial_snapshot(ctx, connection_id).await;
        }
        Err(error) => {
            ctx.hub
                .emit_to(connection_id, ServerMessage::error(error.to_wire_error()))
                .await;
        }
    }
}

async fn handle_set_context(
    ctx: &CoreContext,
    connection_id: &ConnectionId,
    mode: Mode,
    flags: crate::context::ContextFlags,
) {
    let new_context = ClientContext { mode, flags };
    let is_authenticated = ctx
        .sessions
        .get(connection_id)
        .await
        .is_some_and(|s| s.is_authenticated);

    if let Err(error) = check_auth_gate(&new_context, is_authenticated) {
        ctx.hub
            .emit_to(connection_id, ServerMessage::error(error.to_wire_error()))
            .await;
        return;
    }

    let previous = ctx
        .sessions
        .get(connection_id)
        .await
        .and_then(|s| s.current_context);
    if let Some(previous) = previous {
        if previous.mode == Mode::Quiz && new_context.mode != Mode::Quiz {
            if !ctx.quiz.is_round_live().await {
                ctx.quiz.remove_participant(connection_id).await;
            }
        }
        if previous.mode == Mode::Online && new_context.mode != Mode::Online {
            ctx.lobby.leave(connection_id).await;
        }
    }

    ctx.sessions.set_context(connection_id, new_context).await;
}

async fn handle_submit_answer(
    ctx: &CoreContext,
    connection_id: &ConnectionId,
    question_id: &str,
    answer: u8,
) {
    match ctx.quiz.submit_answer(connection_id, question_id, answer).await {
        Ok(()) => {
            ctx.hub
                .emit_to(connection_id, ServerMessage::answerQueued)
                .await;
        }
        Err(error) => {
            ctx.hub
                .emit_to(connection_id, ServerMessage::error(error.to_wire_error()))
                .await;
        }
    }
}

async fn handle_solo_quiz(ctx: &CoreContext, connection_id: &ConnectionId, theme: Option<String>) {
    let theme = theme.unwrap_or_default();
    let questions = ctx
        .question_store
        .sample(&theme, crate::constants::DEFAULT_QUESTION_COUNT)
        .await;
    let snapshot: Vec<_> = questions
        .iter()
        .map(|q| {
            serde_json::json!({
                "id": q.id.0,
                "questionText": q.question_text,
                "responses": q.responses,
            })
        })
        .collect();
    ctx.hub
        .emit_to(connection_id, ServerMessage::soloQuestions(snapshot))
        .await;
}

async fn on_disconnect(ctx: &CoreContext, connection_id: &ConnectionId) {
    ctx.lobby.remove_if_present(connection_id).await;
    ctx.quiz.remove_participant(connection_id).await;
    ctx.sessions.on_disconnect(connection_id).await;
    warn!(%connection_id, "connection closed");
}
