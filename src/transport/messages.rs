//! Wire message catalog (C10). Ingress names per §4.8, egress names per the
//! union of §4.4's subscription table keys. Transport handlers only decode
//! into these and dispatch; all business logic lives in C5-C9.

use serde::{Deserialize, Serialize};

use crate::{context::ContextFlags, models::EventId, wire_error::WireError};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "authenticate")]
    Authenticate { token: String },
    #[serde(rename = "setContext")]
    SetContext {
        mode: crate::context::Mode,
        #[serde(flatten)]
        flags: ContextFlags,
    },
    #[serde(rename = "joinLobby")]
    JoinLobby,
    #[serde(rename = "leaveLobby")]
    LeaveLobby,
    #[serde(rename = "joinInProgress")]
    JoinInProgress,
    #[serde(rename = "submitAnswer")]
    SubmitAnswer { question_id: String, answer: u8 },
    #[serde(rename = "startSoloQuiz")]
    StartSoloQuiz { theme: Option<String> },
    #[serde(rename = "checkEvents")]
    CheckEvents,
    #[serde(rename = "heartbeat_ack")]
    HeartbeatAck,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerMessage {
    connectionStatus(ConnectionStatusPayload),
    error(WireError),
    forceLogout(ForceLogoutPayload),
    heartbeat,
    connectionError(ConnectionErrorPayload),
    connectionRecovered,
    userStats(serde_json::Value),
    nextEvent(Option<EventSummary>),
    lobbyStatus(LobbyStatusPayload),
    lobbyOpened(EventSummary),
    eventCountdown(EventCountdownPayload),
    lobbyClosed(LobbyClosedPayload),
    lobbyJoined(LobbyRosterPayload),
    lobbyUpdate(LobbyRosterPayload),
    lobbyLeft(LobbyRosterPayload),
    eventCancelled(EventCancelledPayload),
    autoStartQuiz(EventSummary),
    eventStarted(EventSummary),
    eventCompleted(EventCompletedPayload),
    quizQuestion(QuizQuestionPayload),
    timerUpdate(TimerUpdatePayload),
    answerQueued,
    playerStats(serde_json::Value),
    adBreakStarted(AdBreakStartedPayload),
    adBreakCountdown(AdBreakCountdownPayload),
    adBreakEnded,
    immediateWinner(ImmediateWinnerPayload),
    answerResult(AnswerResultPayload),
    quizCompleted(QuizCompletedPayload),
    soloQuestions(Vec<serde_json::Value>),
}

impl ServerMessage {
    /// Maps each variant to the §4.4 event name used for subscription
    /// filtering.
    #[must_use]
    pub fn event_name(&self) -> crate::context::EventName {
        use crate::context::EventName as E;
        match self {
            Self::connectionStatus(_) => E::connectionStatus,
            Self::error(_) => E::error,
            Self::forceLogout(_) => E::forceLogout,
            Self::heartbeat => E::heartbeat,
            Self::connectionError(_) => E::connectionError,
            Self::connectionRecovered => E::connectionRecovered,
            Self::userStats(_) => E::userStats,
            Self::nextEvent(_) => E::nextEvent,
            Self::lobbyStatus(_) => E::lobbyStatus,
            Self::lobbyOpened(_) => E::lobbyOpened,
            Self::eventCountdown(_) => E::eventCountdown,
            Self::lobbyClosed(_) => E::lobbyClosed,
            Self::lobbyJoined(_) => E::lobbyJoined,
            Self::lobbyUpdate(_) => E::lobbyUpdate,
            Self::lobbyLeft(_) => E::lobbyLeft,
            Self::eventCancelled(_) => E::eventCancelled,
            Self::autoStartQuiz(_) => E::autoStartQuiz,
            Self::eventStarted(_) => E::eventStarted,
            Self::eventCompleted(_) => E::eventCompleted,
            Self::quizQuestion(_) => E::quizQuestion,
            Self::timerUpdate(_) => E::timerUpdate,
            Self::answerQueued => E::answerQueued,
            Self::playerStats(_) => E::playerStats,
            Self::adBreakStarted(_) => E::adBreakStarted,
            Self::adBreakCountdown(_) => E::adBreakCountdown,
            Self::adBreakEnded => E::adBreakEnded,
            Self::immediateWinner(_) => E::immediateWinner,
            Self::answerResult(_) => E::answerResult,
            Self::quizCompleted(_) => E::quizCompleted,
            Self::soloQuestions(_) => E::soloQuestions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatusPayload {
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForceLogoutPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub id: EventId,
    pub theme: String,
    #[serde(rename = "startAt")]
    pub start_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LobbyStatusPayload {
    pub open: bool,
    pub participants: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCountdownPayload {
    #[serde(rename = "timeLeft")]
    pub time_left: u64,
    pub participants: usize,
    #[serde(rename = "minPlayers")]
    pub min_players: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LobbyClosedPayload {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LobbyRosterPayload {
    pub participants: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCancelledPayload {
    pub required: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCompletedPayload {
    pub winner: String,
    #[serde(rename = "winnerScore")]
    pub winner_score: u32,
    #[serde(rename = "totalParticipants")]
    pub total_participants: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizQuestionPayload {
    #[serde(rename = "questionId")]
    pub question_id: String,
    #[serde(rename = "questionText")]
    pub question_text: String,
    pub responses: [String; 4],
    pub index: usize,
    pub total: usize,
    #[serde(rename = "previousCorrect", skip_serializing_if = "Option::is_none")]
    pub previous_correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerUpdatePayload {
    #[serde(rename = "timeLeft")]
    pub time_left: u64,
    #[serde(rename = "playerStats")]
    pub player_stats: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdBreakStartedPayload {
    pub duration: u64,
    #[serde(rename = "isFinalQuestion")]
    pub is_final_question: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdBreakCountdownPayload {
    #[serde(rename = "timeLeft")]
    pub time_left: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImmediateWinnerPayload {
    pub winner: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResultPayload {
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizCompletedPayload {
    pub score: u32,
    pub answers: Vec<serde_json::Value>,
    #[serde(rename = "isWinner")]
    pub is_winner: bool,
    #[serde(rename = "immediateWin")]
    pub immediate_win: bool,
}
