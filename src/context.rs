//! Context & Subscription Filter (C6).
//!
//! Pure, stateless derivation of the outbound event-subscription table from a
//! client's declared context. Kept as plain functions rather than an
//! aggregate with its own lock, per the declarative-table design note: the
//! table is the single authority consulted by the Broadcast Hub on every
//! emit, and by the transport layer when validating `setContext`.

use error_codes::ErrorCode;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::wire_error::{ToWireError, WireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Home,
    Solo,
    Online,
    Quiz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFlags {
    #[serde(default)]
    pub is_solo: bool,
    #[serde(default)]
    pub is_in_lobby: bool,
    #[serde(default)]
    pub is_in_quiz: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    pub mode: Mode,
    #[serde(flatten)]
    pub flags: ContextFlags,
}

#[derive(Debug, Error, IntoStaticStr)]
pub enum ContextError {
    #[error("invalid setContext payload")]
    InvalidContextPayload,
    #[error("unknown mode")]
    InvalidMode,
    #[error("authentication required for online mode")]
    AuthRequiredForOnline,
    #[error("authentication required for multiplayer quiz mode")]
    AuthRequiredForMultiplayer,
}

impl ErrorCode for ContextError {
    fn to_error_code(&self) -> &'static str {
        match self {
            Self::InvalidContextPayload => "ContextError::InvalidContextPayload",
            Self::InvalidMode => "ContextError::InvalidMode",
            Self::AuthRequiredForOnline => "ContextError::AuthRequiredForOnline",
            Self::AuthRequiredForMultiplayer => "ContextError::AuthRequiredForMultiplayer",
        }
    }
}

impl ToWireError for ContextError {
    fn to_wire_error(&self) -> WireError {
        match self {
            Self::InvalidContextPayload => {
                WireError::new("INVALID_CONTEXT_PAYLOAD", self.to_string())
            }
            Self::InvalidMode => WireError::new("INVALID_MODE", self.to_string()),
            Self::AuthRequiredForOnline => {
                WireError::new("AUTH_REQUIRED_FOR_ONLINE", self.to_string()).with_action("LOGIN")
            }
            Self::AuthRequiredForMultiplayer => {
                WireError::new("AUTH_REQUIRED_FOR_MULTIPLAYER", self.to_string())
                    .with_action("LOGIN")
            }
        }
    }
}

/// Validates the auth gate from §4.4: `online` and `quiz` with `isSolo=false`
/// require an authenticated session.
pub fn check_auth_gate(ctx: &ClientContext, is_authenticated: bool) -> Result<(), ContextError> {
    match ctx.mode {
        Mode::Home | Mode::Solo => Ok(()),
        Mode::Online if is_authenticated => Ok(()),
        Mode::Online => Err(ContextError::AuthRequiredForOnline),
        Mode::Quiz if ctx.flags.is_solo || is_authenticated => Ok(()),
        Mode::Quiz => Err(ContextError::AuthRequiredForMultiplayer),
    }
}

/// Outbound event names, matching §4.4's table columns verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[allow(non_camel_case_types)]
pub enum EventName {
    connectionStatus,
    error,
    forceLogout,
    heartbeat,
    connectionError,
    connectionRecovered,
    userStats,
    nextEvent,
    lobbyStatus,
    lobbyOpened,
    eventCountdown,
    lobbyClosed,
    lobbyJoined,
    lobbyUpdate,
    lobbyLeft,
    eventCancelled,
    autoStartQuiz,
    eventStarted,
    eventCompleted,
    quizQuestion,
    timerUpdate,
    answerQueued,
    playerStats,
    adBreakStarted,
    adBreakCountdown,
    adBreakEnded,
    immediateWinner,
    answerResult,
    quizCompleted,
    soloQuestions,
}

/// The baseline set enabled regardless of context (§4.4).
const ALWAYS_ENABLED: &[EventName] = &[
    EventName::connectionStatus,
    EventName::error,
    EventName::forceLogout,
    EventName::heartbeat,
    EventName::connectionError,
    EventName::connectionRecovered,
];

/// The informational subset a guest may receive in home mode (§4.4).
pub const GUEST_WHITELIST: &[EventName] = &[
    EventName::userStats,
    EventName::lobbyStatus,
    EventName::nextEvent,
    EventName::lobbyOpened,
    EventName::eventCountdown,
    EventName::lobbyClosed,
    EventName::heartbeat,
];

/// Returns whether `event` is enabled for a client in `ctx`, per the §4.4
/// table. Does not apply the guest hard-block; callers combine this with
/// [`is_guest_allowed`] for unauthenticated sessions.
#[must_use]
pub fn is_enabled(ctx: &ClientContext, event: EventName) -> bool {
    if ALWAYS_ENABLED.contains(&event) {
        return true;
    }
    let ContextFlags {
        is_solo,
        is_in_lobby,
        is_in_quiz,
    } = ctx.flags;
    let watching = !is_in_lobby && !is_in_quiz;

    use EventName::{
        adBreakCountdown, adBreakEnded, adBreakStarted, answerQueued, answerResult,
        autoStartQuiz, eventCancelled, eventCompleted, eventStarted, immediateWinner,
        lobbyClosed, lobbyJoined, lobbyLeft, lobbyOpened, lobbyStatus, lobbyUpdate, nextEvent,
        playerStats, quizCompleted, quizQuestion, soloQuestions, timerUpdate, userStats,
    };

    match (ctx.mode, event) {
        (Mode::Home, userStats | nextEvent | lobbyStatus | lobbyOpened) => true,
        (Mode::Solo, soloQuestions) => true,
        (Mode::Online, userStats) => true,
        (Mode::Online, EventName::eventCountdown | lobbyClosed) if is_in_lobby => true,
        (
            Mode::Online,
            lobbyJoined | lobbyUpdate | lobbyLeft | eventCancelled | autoStartQuiz | eventStarted
            | eventCompleted,
        ) if watching || is_in_lobby => true,
        (Mode::Quiz, userStats) => true,
        (Mode::Quiz, EventName::eventCountdown | lobbyClosed) if is_in_lobby => true,
        (
            Mode::Quiz,
            lobbyJoined | lobbyUpdate | lobbyLeft | eventCancelled | autoStartQuiz | eventStarted
            | eventCompleted,
        ) if watching || is_in_lobby || is_in_quiz => true,
        (
            Mode::Quiz,
            quizQuestion | timerUpdate | answerQueued | playerStats | adBreakStarted
            | adBreakCountdown | adBreakEnded | immediateWinner | answerResult | quizCompleted,
        ) if is_in_quiz => true,
        _ => false,
    }
}

/// Combines the per-mode table with the guest hard-block: unauthenticated
/// clients only ever receive [`GUEST_WHITELIST`] events, regardless of what
/// their declared context would otherwise permit.
#[must_use]
pub fn is_delivery_allowed(ctx: &ClientContext, is_authenticated: bool, event: EventName) -> bool {
    if !is_authenticated {
        return GUEST_WHITELIST.contains(&event) && is_enabled(ctx, event);
    }
    is_enabled(ctx, event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_subscription_table() {
        let ctx = ClientContext {
            mode: Mode::Online,
            flags: ContextFlags {
                is_solo: false,
                is_in_lobby: true,
                is_in_quiz: false,
            },
        };
        let first: Vec<bool> = (0..30).map(|_| is_enabled(&ctx, EventName::lobbyUpdate)).collect();
        assert!(first.iter().all(|v| *v == first[0]));
    }

    #[test]
    fn guest_is_hard_blocked_from_gameplay() {
        let ctx = ClientContext {
            mode: Mode::Home,
            flags: ContextFlags::default(),
        };
        assert!(!is_delivery_allowed(&ctx, false, EventName::quizQuestion));
        assert!(is_delivery_allowed(&ctx, false, EventName::lobbyOpened));
    }

    #[test]
    fn home_mode_never_sees_quiz_question() {
        let ctx = ClientContext {
            mode: Mode::Home,
            flags: ContextFlags::default(),
        };
        assert!(is_delivery_allowed(&ctx, true, EventName::lobbyOpened));
        assert!(!is_delivery_allowed(&ctx, true, EventName::quizQuestion));
    }

    #[test]
    fn auth_gate_rejects_guest_online() {
        let ctx = ClientContext {
            mode: Mode::Online,
            flags: ContextFlags::default(),
        };
        assert!(matches!(
            check_auth_gate(&ctx, false),
            Err(ContextError::AuthRequiredForOnline)
        ));
    }

    #[test]
    fn auth_gate_allows_solo_quiz_without_auth() {
        let ctx = ClientContext {
            mode: Mode::Quiz,
            flags: ContextFlags {
                is_solo: true,
                ..ContextFlags::default()
            },
        };
        assert!(check_auth_gate(&ctx, false).is_ok());
    }
}
