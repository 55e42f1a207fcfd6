//! Session Registry (C5): per-connection session, authentication fusion, and
//! single-session-per-user enforcement.
//!
//! Grounded on the teacher's `SharedLobbyState`/`SharedContributorState`
//! pattern: a `Clone`-able handle wrapping `Arc<Mutex<..>>`, with
//! predicate-based bulk mutation rather than hand-rolled iteration at every
//! call site.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use clap::Parser;
use error_codes::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::IntoStaticStr;
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    context::ClientContext,
    models::UserId,
    transport::messages::ServerMessage,
    wire_error::{ToWireError, WireError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Parser)]
pub struct Options {
    /// Heartbeat emit frequency, in seconds.
    #[clap(long, env, default_value = "25")]
    pub heartbeat_interval_secs: u64,

    /// System check frequency (heap-pressure eviction), in seconds.
    #[clap(long, env, default_value = "60")]
    pub system_check_interval_secs: u64,

    /// Sessions idle longer than this are evicted during a system check that
    /// finds heap utilization over the threshold, in seconds.
    #[clap(long, env, default_value = "600")]
    pub idle_eviction_secs: u64,
}

#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename = "connection_id")]
pub struct ConnectionId(pub String);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, IntoStaticStr)]
pub enum SessionError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid bearer token")]
    InvalidToken,
    #[error("unknown session id")]
    SessionNotFound,
}

impl ErrorCode for SessionError {
    fn to_error_code(&self) -> &'static str {
        match self {
            Self::MissingToken => "SessionError::MissingToken",
            Self::InvalidToken => "SessionError::InvalidToken",
            Self::SessionNotFound => "SessionError::SessionNotFound",
        }
    }
}

impl ToWireError for SessionError {
    fn to_wire_error(&self) -> WireError {
        match self {
            Self::MissingToken => WireError::new("MISSING_TOKEN", self.to_string()),
            Self::InvalidToken => WireError::new("INVALID_TOKEN", self.to_string()),
            Self::SessionNotFound => WireError::new("SESSION_NOT_FOUND", self.to_string()),
        }
    }
}

/// The loosely-typed claims extracted from the unverified middle segment of
/// a three-part bearer token. No signature check is performed here: per
/// §4.3, authentication fusion trusts whatever issued the token upstream.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub username: String,
    pub phone_number: String,
}

/// Splits `token` on `.`, base64url-decodes the middle segment, and reads
/// `sub`/`userId`/`id` (first present wins) as the user id.
pub fn parse_token(token: &str) -> Result<TokenClaims, SessionError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(SessionError::InvalidToken);
    };
    let decoded = base64::decode_config(payload, base64::URL_SAFE_NO_PAD)
        .map_err(|_| SessionError::InvalidToken)?;
    let json: Value = serde_json::from_slice(&decoded).map_err(|_| SessionError::InvalidToken)?;

    let user_id = json
        .get("sub")
        .or_else(|| json.get("userId"))
        .or_else(|| json.get("id"))
        .and_then(Value::as_str)
        .ok_or(SessionError::InvalidToken)?
        .to_owned();
    let username = json
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let phone_number = json
        .get("phoneNumber")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    Ok(TokenClaims {
        user_id: UserId(user_id),
        username,
        phone_number,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    Guest,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipationMode {
    None,
    Play,
    Watch,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: Option<UserId>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub user_type: UserType,
    pub connected_at: Instant,
    pub last_activity_at: Instant,
    pub participation_mode: ParticipationMode,
    pub current_context: Option<ClientContext>,
    pub countdown_throttled_at: Option<Instant>,
    pub sender: Option<tokio::sync::mpsc::UnboundedSender<ServerMessage>>,
}

impl Session {
    fn new(connection_id: ConnectionId) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            user_id: None,
            token: None,
            is_authenticated: false,
            user_type: UserType::Guest,
            connected_at: now,
            last_activity_at: now,
            participation_mode: ParticipationMode::None,
            current_context: None,
            countdown_throttled_at: None,
            sender: None,
        }
    }
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<ConnectionId, Session>,
    user_index: HashMap<UserId, ConnectionId>,
}

/// Outcome of [`SessionRegistry::authenticate`]: the caller (transport
/// dispatch) uses this to decide which wire events to emit and to whom.
pub enum AuthenticateOutcome {
    /// Freshly authenticated; no prior connection bound to this user.
    Fresh,
    /// Same token re-sent on (presumably) the same logical client; rebind
    /// only.
    Rebound,
    /// A different connection was already bound to this user with a
    /// different token; it must be force-logged-out by the caller.
    DisplacedPrevious(ConnectionId),
}

#[derive(Clone, Default)]
pub struct SessionRegistry(std::sync::Arc<Mutex<SessionTable>>);

impl SessionRegistry {
    pub async fn on_connect(
        &self,
        connection_id: ConnectionId,
        sender: tokio::sync::mpsc::UnboundedSender<ServerMessage>,
    ) {
        let mut session = Session::new(connection_id.clone());
        session.sender = Some(sender);
        let mut table = self.0.lock().await;
        table.sessions.insert(connection_id, session);
    }

    pub async fn sender_of(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<tokio::sync::mpsc::UnboundedSender<ServerMessage>> {
        self.0
            .lock()
            .await
            .sessions
            .get(connection_id)
            .and_then(|s| s.sender.clone())
    }

    pub async fn all_sessions(&self) -> Vec<Session> {
        self.0.lock().await.sessions.values().cloned().collect()
    }

    pub async fn authenticate(
        &self,
        connection_id: &ConnectionId,
        token: &str,
    ) -> Result<AuthenticateOutcome, SessionError> {
        let claims = parse_token(token)?;
        let mut table = self.0.lock().await;

        let outcome = match table.user_index.get(&claims.user_id).cloned() {
            Some(existing) if existing == *connection_id => AuthenticateOutcome::Rebound,
            Some(existing) => {
                let same_token = table
                    .sessions
                    .get(&existing)
                    .and_then(|s| s.token.as_deref())
                    == Some(token);
                if same_token {
                    AuthenticateOutcome::Rebound
                } else {
                    AuthenticateOutcome::DisplacedPrevious(existing)
                }
            }
            None => AuthenticateOutcome::Fresh,
        };

        let session = table
            .sessions
            .get_mut(connection_id)
            .ok_or(SessionError::SessionNotFound)?;
        session.user_id = Some(claims.user_id.clone());
        session.token = Some(token.to_owned());
        session.is_authenticated = true;
        session.user_type = UserType::Authenticated;
        table
            .user_index
            .insert(claims.user_id, connection_id.clone());
        debug!(%connection_id, "session authenticated");
        Ok(outcome)
    }

    pub async fn on_disconnect(&self, connection_id: &ConnectionId) {
        let mut table = self.0.lock().await;
        if let Some(session) = table.sessions.remove(connection_id) {
            if let Some(user_id) = session.user_id {
                if table.user_index.get(&user_id) == Some(connection_id) {
                    table.user_index.remove(&user_id);
                }
            }
        }
    }

    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Session> {
        self.0.lock().await.sessions.get(connection_id).cloned()
    }

    pub async fn set_context(&self, connection_id: &ConnectionId, ctx: ClientContext) {
        let mut table = self.0.lock().await;
        if let Some(session) = table.sessions.get_mut(connection_id) {
            session.current_context = Some(ctx);
        }
    }

    pub async fn set_participation_mode(
        &self,
        connection_id: &ConnectionId,
        mode: ParticipationMode,
    ) {
        let mut table = self.0.lock().await;
        if let Some(session) = table.sessions.get_mut(connection_id) {
            session.participation_mode = mode;
        }
    }

    pub async fn record_activity(&self, connection_id: &ConnectionId) {
        let mut table = self.0.lock().await;
        if let Some(session) = table.sessions.get_mut(connection_id) {
            session.last_activity_at = Instant::now();
        }
    }

    pub async fn try_throttle_countdown(
        &self,
        connection_id: &ConnectionId,
        window: std::time::Duration,
    ) -> bool {
        let mut table = self.0.lock().await;
        let Some(session) = table.sessions.get_mut(connection_id) else {
            return false;
        };
        let now = Instant::now();
        let allowed = session
            .countdown_throttled_at
            .map_or(true, |last| now.duration_since(last) >= window);
        if allowed {
            session.countdown_throttled_at = Some(now);
        }
        allowed
    }

    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.0.lock().await.sessions.keys().cloned().collect()
    }

    /// §4.3 system check: when heap pressure is high, evict sessions that
    /// have been idle longer than `idle_eviction`. Returns the evicted ids
    /// so the caller can clear them from Lobby/Quiz participant maps too.
    pub async fn evict_idle(&self, idle_eviction: std::time::Duration) -> Vec<ConnectionId> {
        let mut table = self.0.lock().await;
        let now = Instant::now();
        let stale: Vec<ConnectionId> = table
            .sessions
            .values()
            .filter(|s| now.duration_since(s.last_activity_at) > idle_eviction)
            .map(|s| s.connection_id.clone())
            .collect();
        for cid in &stale {
            if let Some(session) = table.sessions.remove(cid) {
                if let Some(user_id) = session.user_id {
                    if table.user_index.get(&user_id) == Some(cid) {
                        table.user_index.remove(&user_id);
                    }
                }
            }
        }
        if !stale.is_empty() {
            warn!(count = stale.len(), "evicted idle sessions under heap pressure");
        }
        stale
    }
}

/// Every `heartbeat_interval`, emit `heartbeat` to every connected client.
/// Spawned once at startup alongside the scheduler loops.
pub async fn heartbeat_loop(
    sessions: SessionRegistry,
    hub: crate::broadcast::BroadcastHub,
    heartbeat_interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(heartbeat_interval);
    loop {
        ticker.tick().await;
        for connection_id in sessions.connection_ids().await {
            hub.emit_to(&connection_id, crate::transport::messages::ServerMessage::heartbeat)
                .await;
        }
    }
}

/// Every `check_interval`, when heap utilization exceeds
/// [`crate::constants::HEAP_EVICTION_THRESHOLD`], evict sessions idle longer
/// than `idle_eviction` and cascade the removal through Lobby/Quiz.
pub async fn system_check_loop(
    sessions: SessionRegistry,
    lobby: crate::lobby::LobbyManager,
    check_interval: std::time::Duration,
    idle_eviction: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(check_interval);
    loop {
        ticker.tick().await;
        if heap_utilization() <= crate::constants::HEAP_EVICTION_THRESHOLD {
            continue;
        }
        let evicted = sessions.evict_idle(idle_eviction).await;
        for connection_id in evicted {
            lobby.remove_if_present(&connection_id).await;
        }
    }
}

/// Process resident memory as a fraction of total system memory. Returns
/// `0.0` if the current process or system memory can't be read.
fn heap_utilization() -> f32 {
    use sysinfo::System;

    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_process(pid);
    let Some(process) = system.process(pid) else {
        return 0.0;
    };
    let total = system.total_memory();
    if total == 0 {
        return 0.0;
    }
    process.memory() as f32 / total as f32
}
