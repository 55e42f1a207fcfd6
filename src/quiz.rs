//! Quiz Engine (C8): the global synchronous multi-player round. Grounded on
//! the quiz-app's `ServerState` (per-participant answer vectors, score,
//! `finished_at`, leaderboard sort by score desc / finish-time asc) and on
//! jet_raiders' one-authoritative-tick-loop-per-round pattern.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration as StdDuration,
};

use chrono::{DateTime, Utc};
use error_codes::ErrorCode;
use serde_json::json;
use strum::IntoStaticStr;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::{
    broadcast::BroadcastHub,
    constants::{AD_BREAK_DURATION, PER_QUESTION_DURATION, ROUND_TEARDOWN_GRACE},
    event_store::EventStore,
    models::{Event, EventPatch, Question, QuestionId},
    question_store::QuestionStore,
    sessions::{ConnectionId, SessionRegistry},
    transport::messages::{
        AdBreakCountdownPayload, AdBreakStartedPayload, AnswerResultPayload, EventCompletedPayload,
        EventSummary, ImmediateWinnerPayload, QuizCompletedPayload, QuizQuestionPayload,
        ServerMessage, TimerUpdatePayload,
    },
    user_store::UserStore,
    wire_error::{ToWireError, WireError},
};

#[derive(Debug, Error, IntoStaticStr)]
pub enum QuizError {
    #[error("no quiz round is currently live")]
    NoRoundLive,
    #[error("you are in watcher mode for the remainder of this round")]
    Watching,
    #[error("time is up for the current question")]
    TimeExpired,
    #[error("answer does not match the current question")]
    QuestionMismatch,
}

impl ErrorCode for QuizError {
    fn to_error_code(&self) -> &'static str {
        match self {
            Self::NoRoundLive => "QuizError::NoRoundLive",
            Self::Watching => "QuizError::Watching",
            Self::TimeExpired => "QuizError::TimeExpired",
            Self::QuestionMismatch => "QuizError::QuestionMismatch",
        }
    }
}

impl ToWireError for QuizError {
    fn to_wire_error(&self) -> WireError {
        match self {
            Self::Watching => {
                WireError::new("WATCHING", "Vous êtes en mode surveillance pour ce round.")
            }
            _ => WireError::new("INVALID_SUBMISSION", self.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct AnswerRecord {
    question_id: QuestionId,
    user_answer: u8,
    correct: bool,
    submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingAnswer {
    question_id: QuestionId,
    answer: u8,
}

#[derive(Debug, Clone)]
struct Participant {
    score: u32,
    answers: Vec<AnswerRecord>,
    is_watching: bool,
    pending: Option<PendingAnswer>,
    finished_at: Option<DateTime<Utc>>,
    last_correct_at: Option<DateTime<Utc>>,
}

impl Participant {
    fn new() -> Self {
        Self {
            score: 0,
            answers: Vec::new(),
            is_watching: false,
            pending: None,
            finished_at: None,
            last_correct_at: None,
        }
    }
}

struct RoundState {
    event: Event,
    questions: Vec<Question>,
    current_index: usize,
    time_left: u64,
    participants: HashMap<ConnectionId, Participant>,
    immediate_winner: Option<ConnectionId>,
}

impl RoundState {
    fn current_question(&self) -> &Question {
        &self.questions[self.current_index]
    }

    fn is_final_question(&self) -> bool {
        self.current_index + 1 == self.questions.len()
    }
}

#[derive(Clone)]
pub struct QuizEngine {
    state: Arc<Mutex<Option<RoundState>>>,
    notify: Arc<Notify>,
    event_store: Arc<EventStore>,
    question_store: Arc<QuestionStore>,
    user_store: Arc<UserStore>,
    sessions: SessionRegistry,
}

impl QuizEngine {
    #[must_use]
    pub fn new(
        event_store: Arc<EventStore>,
        question_store: Arc<QuestionStore>,
        user_store: Arc<UserStore>,
        sessions: SessionRegistry,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
            notify: Arc::new(Notify::new()),
            event_store,
            question_store,
            user_store,
            sessions,
        }
    }

    pub async fn is_round_live(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// `joinInProgress`: a client that missed the lobby joins the live round
    /// as a watcher whenever the round has moved past the first question,
    /// or when it already has a wrong-answer record from before a
    /// reconnect. Returns `false` when no round is live.
    pub async fn join_in_progress(&self, connection_id: ConnectionId) -> bool {
        let mut state = self.state.lock().await;
        let Some(round) = state.as_mut() else {
            return false;
        };
        let is_final_index_reached = round.current_index > 0;
        let participant = round
            .participants
            .entry(connection_id)
            .or_insert_with(Participant::new);
        if is_final_index_reached {
            participant.is_watching = true;
        }
        true
    }

    pub async fn remove_participant(&self, connection_id: &ConnectionId) {
        let mut state = self.state.lock().await;
        if let Some(round) = state.as_mut() {
            round.participants.remove(connection_id);
        }
    }

    /// Hand-off: fetch questions, initialize per-participant state, emit
    /// `eventStarted`/`autoStartQuiz`, then spawn the round's single
    /// authoritative driver task.
    pub async fn start_round(
        &self,
        event: Event,
        participant_ids: HashSet<ConnectionId>,
        hub: BroadcastHub,
    ) {
        let questions = self
            .question_store
            .sample(&event.theme, event.question_count)
            .await;
        if questions.is_empty() {
            warn!(event = %event.id, "no questions available, aborting round hand-off");
            return;
        }

        if let Err(error) = self
            .event_store
            .update(
                &event.id,
                &EventPatch {
                    is_started: Some(true),
                    ..EventPatch::default()
                },
            )
            .await
        {
            warn!(%error, event = %event.id, "failed to mark event started");
        }

        let mut participants = HashMap::new();
        for cid in &participant_ids {
            participants.insert(cid.clone(), Participant::new());
        }

        {
            let mut state = self.state.lock().await;
            *state = Some(RoundState {
                event: event.clone(),
                questions,
                current_index: 0,
                time_left: PER_QUESTION_DURATION.as_secs(),
                participants,
                immediate_winner: None,
            });
        }

        let summary = EventSummary {
            id: event.id.clone(),
            theme: event.theme.clone(),
            start_at: event.start_at,
        };
        for cid in &participant_ids {
            if let Some(session) = self.sessions.get(cid).await {
                if session.is_authenticated {
                    hub.emit_to(cid, ServerMessage::eventStarted(summary.clone()))
                        .await;
                    hub.emit_to(cid, ServerMessage::autoStartQuiz(summary.clone()))
                        .await;
                }
            }
        }

        let engine = self.clone();
        tokio::spawn(async move { engine.run_round(hub).await });
    }

    async fn run_round(&self, hub: BroadcastHub) {
        loop {
            self.emit_question_phase(&hub).await;

            let remaining = PER_QUESTION_DURATION.as_secs();
            let mut ticked = 0u64;
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                tokio::select! {
                    () = tokio::time::sleep(StdDuration::from_secs(1)) => {
                        ticked += 1;
                        let Some(time_left) = self.tick_timer(remaining.saturating_sub(ticked)).await else {
                            return;
                        };
                        self.emit_timer_update(&hub, time_left).await;
                        if time_left == 0 {
                            break;
                        }
                    }
                    () = &mut notified => {
                        if self.handle_immediate_win_if_any(&hub).await {
                            return;
                        }
                    }
                }
            }

            self.tally(&hub).await;

            let done = {
                let mut state = self.state.lock().await;
                let Some(round) = state.as_mut() else { return };
                round.current_index += 1;
                if round.current_index >= round.questions.len() {
                    true
                } else {
                    round.time_left = PER_QUESTION_DURATION.as_secs();
                    false
                }
            };

            if done {
                self.terminal_tally(&hub).await;
                return;
            }

            if self.is_before_final_question().await {
                self.run_ad_break(&hub).await;
            }
        }
    }

    async fn is_before_final_question(&self) -> bool {
        let state = self.state.lock().await;
        state.as_ref().is_some_and(RoundState::is_final_question)
    }

    async fn tick_timer(&self, time_left: u64) -> Option<u64> {
        let mut state = self.state.lock().await;
        let round = state.as_mut()?;
        round.time_left = time_left;
        Some(time_left)
    }

    async fn emit_timer_update(&self, hub: &BroadcastHub, time_left: u64) {
        let stats = self.player_stats_json().await;
        hub.broadcast(ServerMessage::timerUpdate(TimerUpdatePayload {
            time_left,
            player_stats: stats,
        }))
        .await;
    }

    async fn player_stats_json(&self) -> serde_json::Value {
        let state = self.state.lock().await;
        let Some(round) = state.as_ref() else {
            return json!([]);
        };
        let stats: Vec<_> = round
            .participants
            .iter()
            .map(|(cid, p)| json!({ "connectionId": cid.0, "score": p.score }))
            .collect();
        json!(stats)
    }

    async fn emit_question_phase(&self, hub: &BroadcastHub) {
        let (payload_per_cid, _index) = {
            let state = self.state.lock().await;
            let Some(round) = state.as_ref() else { return };
            let question = round.current_question();
            let mut per_cid = Vec::new();
            for (cid, participant) in &round.participants {
                let previous_correct = (round.current_index > 0)
                    .then(|| participant.answers.last().map(|a| a.correct))
                    .flatten();
                per_cid.push((
                    cid.clone(),
                    QuizQuestionPayload {
                        question_id: question.id.0.clone(),
                        question_text: question.question_text.clone(),
                        responses: question.responses.clone(),
                        index: round.current_index,
                        total: round.questions.len(),
                        previous_correct,
                    },
                ));
            }
            (per_cid, round.current_index)
        };

        for (cid, payload) in payload_per_cid {
            hub.emit_to(&cid, ServerMessage::quizQuestion(payload)).await;
        }
    }

    /// `submitAnswer`. Buffers the answer; also detects the final-question
    /// immediate-win shortcut and wakes the round driver early.
    pub async fn submit_answer(
        &self,
        connection_id: &ConnectionId,
        question_id: &str,
        answer: u8,
    ) -> Result<(), QuizError> {
        let mut state = self.state.lock().await;
        let round = state.as_mut().ok_or(QuizError::NoRoundLive)?;
        if round.time_left == 0 {
            return Err(QuizError::TimeExpired);
        }
        let current = round.current_question();
        if current.id.0 != question_id {
            return Err(QuizError::QuestionMismatch);
        }
        let is_final = round.is_final_question();
        let correct_response = current.correct_response;
        let participant = round
            .participants
            .get_mut(connection_id)
            .ok_or(QuizError::NoRoundLive)?;
        if participant.is_watching {
            return Err(QuizError::Watching);
        }
        participant.pending = Some(PendingAnswer {
            question_id: QuestionId(question_id.to_owned()),
            answer,
        });

        if is_final && answer == correct_response {
            round.immediate_winner = Some(connection_id.clone());
            drop(state);
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn handle_immediate_win_if_any(&self, hub: &BroadcastHub) -> bool {
        let (winner, event, participants) = {
            let mut state = self.state.lock().await;
            let Some(round) = state.as_mut() else {
                return true;
            };
            let Some(winner) = round.immediate_winner.clone() else {
                return false;
            };
            let now = Utc::now();
            if let Some(p) = round.participants.get_mut(&winner) {
                p.score += 1;
                p.finished_at = Some(now);
                p.last_correct_at = Some(now);
            }
            (winner, round.event.clone(), round.participants.clone())
        };

        let winner_identifier = self.winner_identifier(&winner).await;
        self.persist_winner(&event, &winner_identifier).await;

        hub.emit_to(
            &winner,
            ServerMessage::immediateWinner(ImmediateWinnerPayload {
                winner: winner_identifier.clone(),
            }),
        )
        .await;
        for cid in participants.keys() {
            let is_winner = *cid == winner;
            hub.emit_to(
                cid,
                ServerMessage::quizCompleted(QuizCompletedPayload {
                    score: participants[cid].score,
                    answers: Vec::new(),
                    is_winner,
                    immediate_win: true,
                }),
            )
            .await;
        }

        info!(event = %event.id, winner = %winner_identifier, "immediate win");
        self.teardown_after_grace().await;
        true
    }

    async fn tally(&self, hub: &BroadcastHub) {
        let mut results = Vec::new();
        {
            let mut state = self.state.lock().await;
            let Some(round) = state.as_mut() else { return };
            let correct_response = round.current_question().correct_response;
            let current_question_id = round.current_question().id.clone();
            let current_index = round.current_index;
            for (cid, participant) in &mut round.participants {
                let now = Utc::now();
                let (user_answer, correct) = match participant.pending.take() {
                    Some(pending) if pending.question_id == current_question_id => {
                        let correct = pending.answer == correct_response;
                        if correct {
                            participant.score += 1;
                            participant.last_correct_at = Some(now);
                        } else {
                            participant.is_watching = true;
                        }
                        (pending.answer, correct)
                    }
                    _ => {
                        if !participant.is_watching {
                            participant.is_watching = true;
                        }
                        (0, false)
                    }
                };
                participant.answers.push(AnswerRecord {
                    question_id: current_question_id.clone(),
                    user_answer,
                    correct,
                    submitted_at: now,
                });
                results.push((cid.clone(), correct));
                let _ = current_index;
            }
        }
        for (cid, correct) in results {
            hub.emit_to(&cid, ServerMessage::answerResult(AnswerResultPayload { correct }))
                .await;
        }
    }

    async fn run_ad_break(&self, hub: &BroadcastHub) {
        hub.broadcast(ServerMessage::adBreakStarted(AdBreakStartedPayload {
            duration: AD_BREAK_DURATION.as_secs(),
            is_final_question: true,
        }))
        .await;
        let mut remaining = AD_BREAK_DURATION.as_secs();
        while remaining > 0 {
            tokio::time::sleep(StdDuration::from_secs(1)).await;
            remaining -= 1;
            hub.broadcast(ServerMessage::adBreakCountdown(AdBreakCountdownPayload {
                time_left: remaining,
            }))
            .await;
            if !self.is_round_live().await {
                return;
            }
        }
        hub.broadcast(ServerMessage::adBreakEnded).await;
    }

    /// Winner selection when the round ends by timer: score > 0, ordered by
    /// score desc then `lastCorrectAt` asc.
    async fn terminal_tally(&self, hub: &BroadcastHub) {
        let (event, participants) = {
            let state = self.state.lock().await;
            let Some(round) = state.as_ref() else { return };
            (round.event.clone(), round.participants.clone())
        };

        let mut contenders: Vec<_> = participants
            .iter()
            .filter(|(_, p)| p.score > 0)
            .collect();
        contenders.sort_by(|(_, a), (_, b)| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.last_correct_at.cmp(&b.last_correct_at))
        });

        let winner_cid = contenders.first().map(|(cid, _)| (*cid).clone());
        let winner_identifier = match &winner_cid {
            Some(cid) => self.winner_identifier(cid).await,
            None => "no-winner".to_owned(),
        };
        let winner_score = winner_cid
            .as_ref()
            .and_then(|cid| participants.get(cid))
            .map_or(0, |p| p.score);

        self.persist_winner(&event, &winner_identifier).await;

        hub.broadcast(ServerMessage::eventCompleted(EventCompletedPayload {
            winner: winner_identifier.clone(),
            winner_score,
            total_participants: participants.len(),
        }))
        .await;

        for (cid, participant) in &participants {
            hub.emit_to(
                cid,
                ServerMessage::quizCompleted(QuizCompletedPayload {
                    score: participant.score,
                    answers: participant
                        .answers
                        .iter()
                        .map(|a| {
                            json!({
                                "questionId": a.question_id.0,
                                "userAnswer": a.user_answer,
                                "correct": a.correct,
                            })
                        })
                        .collect(),
                    is_winner: Some(cid.clone()) == winner_cid,
                    immediate_win: false,
                }),
            )
            .await;
        }

        info!(event = %event.id, winner = %winner_identifier, "round completed by timer");
        self.teardown_after_grace().await;
    }

    /// Storage failures during winner persistence are retried once using
    /// the connectionId as fallback identifier; both failures are logged and
    /// the round proceeds regardless — the in-memory broadcast still
    /// occurs.
    async fn persist_winner(&self, event: &Event, winner: &str) {
        let patch = EventPatch {
            is_completed: Some(true),
            completed_at: Some(Some(Utc::now())),
            winner: Some(Some(winner.to_owned())),
            next_event_created: Some(false),
            ..EventPatch::default()
        };
        if self.event_store.update(&event.id, &patch).await.is_ok() {
            return;
        }
        warn!(event = %event.id, "winner persistence failed, retrying once");
        if let Err(error) = self.event_store.update(&event.id, &patch).await {
            warn!(%error, event = %event.id, "winner persistence failed twice, proceeding in-memory only");
        }
    }

    async fn winner_identifier(&self, connection_id: &ConnectionId) -> String {
        if let Some(session) = self.sessions.get(connection_id).await {
            if let Some(user_id) = &session.user_id {
                if let Some(user) = self.user_store.find_by_id(user_id).await {
                    if !user.phone_number.is_empty() {
                        return user.phone_number;
                    }
                }
                return user_id.0.clone();
            }
        }
        connection_id.0.clone()
    }

    async fn teardown_after_grace(&self) {
        tokio::time::sleep(ROUND_TEARDOWN_GRACE).await;
        let mut state = self.state.lock().await;
        *state = None;
    }
}
