//! Lobby Manager (C7): owns at most one open lobby, runs its pre-event
//! countdown, and hands off to the Quiz Engine. Grounded on the teacher's
//! `SharedLobbyState`/`ActiveContributor` state machine (one contribution
//! slot generalized to one lobby with N participants) and on the
//! jet_raiders `LobbyRegistry`'s tick-loop-plus-teardown shape.

use std::{collections::HashSet, sync::Arc};

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use tokio::{sync::Mutex, task::JoinHandle, time::interval};
use tracing::{debug, info, warn};

use crate::{
    broadcast::BroadcastHub,
    constants::{COUNTDOWN_EMIT_THROTTLE, COUNTDOWN_TICK, LOBBY_JOIN_WINDOW, LOBBY_RECREATE_WINDOW},
    event_store::EventStore,
    models::{Event, EventId, EventPatch},
    quiz::QuizEngine,
    sessions::ConnectionId,
    transport::messages::{
        EventCancelledPayload, EventCountdownPayload, EventSummary, LobbyClosedPayload,
        LobbyRosterPayload, ServerMessage,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Parser)]
pub struct Options {
    /// How far ahead of an event's `startAt` the lobby opens, in seconds.
    #[clap(long, env, default_value = "60")]
    pub join_window_secs: i64,

    /// After a destroyed lobby, how far past `startAt` a lobby may still be
    /// recreated while preserving its previous participants, in seconds.
    #[clap(long, env, default_value = "120")]
    pub recreate_window_secs: i64,
}

struct OpenLobby {
    event: Event,
    participants: HashSet<ConnectionId>,
    ticker: JoinHandle<()>,
}

#[derive(Default)]
struct LobbyState {
    open: Option<OpenLobby>,
}

#[derive(Clone)]
pub struct LobbyManager {
    state: Arc<Mutex<LobbyState>>,
    event_store: Arc<EventStore>,
    quiz: QuizEngine,
    hub: BroadcastHub,
}

impl LobbyManager {
    #[must_use]
    pub fn new(event_store: Arc<EventStore>, quiz: QuizEngine, hub: BroadcastHub) -> Self {
        Self {
            state: Arc::new(Mutex::new(LobbyState::default())),
            event_store,
            quiz,
            hub,
        }
    }

    pub async fn has_open_lobby(&self) -> bool {
        self.state.lock().await.open.is_some()
    }

    /// `openLobby(event)`. No-ops (with a log line) if any precondition
    /// fails.
    pub async fn open_lobby(&self, event: Event) {
        let now = Utc::now();
        if self.quiz.is_round_live().await {
            debug!(event = %event.id, "skip openLobby: a quiz round is live");
            return;
        }
        if now >= event.start_at {
            debug!(event = %event.id, "skip openLobby: event already due");
            return;
        }
        if now < event.start_at - ChronoDuration::seconds(LOBBY_JOIN_WINDOW.as_secs() as i64) {
            debug!(event = %event.id, "skip openLobby: outside join window");
            return;
        }

        let mut state = self.state.lock().await;
        if state.open.is_some() {
            debug!(event = %event.id, "skip openLobby: a lobby is already open");
            return;
        }

        if let Err(error) = self
            .event_store
            .update(
                &event.id,
                &EventPatch {
                    lobby_open: Some(true),
                    ..EventPatch::default()
                },
            )
            .await
        {
            warn!(%error, event = %event.id, "failed to mark lobby_open, proceeding anyway");
        }

        info!(event = %event.id, "lobby opened");
        self.hub
            .broadcast(ServerMessage::lobbyOpened(EventSummary {
                id: event.id.clone(),
                theme: event.theme.clone(),
                start_at: event.start_at,
            }))
            .await;

        let ticker = tokio::spawn(Self::run_countdown(
            self.state.clone(),
            self.event_store.clone(),
            self.quiz.clone(),
            self.hub.clone(),
            event.id.clone(),
        ));

        state.open = Some(OpenLobby {
            event,
            participants: HashSet::new(),
            ticker,
        });
    }

    async fn run_countdown(
        state: Arc<Mutex<LobbyState>>,
        event_store: Arc<EventStore>,
        quiz: QuizEngine,
        hub: BroadcastHub,
        event_id: EventId,
    ) {
        let mut ticker = interval(COUNTDOWN_TICK);
        loop {
            ticker.tick().await;
            let (time_left_ms, min_players, participants) = {
                let guard = state.lock().await;
                let Some(open) = guard.open.as_ref() else {
                    return;
                };
                if open.event.id != event_id {
                    return;
                }
                let remaining = open.event.start_at - Utc::now();
                (
                    remaining.num_milliseconds().max(0) as u64,
                    open.event.min_players,
                    open.participants.len(),
                )
            };

            hub.broadcast_throttled(
                ServerMessage::eventCountdown(EventCountdownPayload {
                    time_left: time_left_ms / 1000,
                    participants,
                    min_players,
                }),
                COUNTDOWN_EMIT_THROTTLE,
            )
            .await;

            if time_left_ms == 0 {
                Self::on_countdown_expired(state, event_store, quiz, hub).await;
                return;
            }
        }
    }

    async fn on_countdown_expired(
        state: Arc<Mutex<LobbyState>>,
        event_store: Arc<EventStore>,
        quiz: QuizEngine,
        hub: BroadcastHub,
    ) {
        let open = {
            let mut guard = state.lock().await;
            guard.open.take()
        };
        let Some(open) = open else { return };

        if open.participants.is_empty() {
            let min_players = open.event.min_players;
            if let Err(error) = event_store
                .update(
                    &open.event.id,
                    &EventPatch {
                        is_completed: Some(true),
                        completed_at: Some(Some(Utc::now())),
                        winner: Some(Some("no-winner".to_owned())),
                        next_event_created: Some(false),
                        ..EventPatch::default()
                    },
                )
                .await
            {
                warn!(%error, event = %open.event.id, "failed to persist empty-lobby cancellation");
            }
            hub.broadcast(ServerMessage::eventCancelled(EventCancelledPayload {
                required: min_players,
                actual: 0,
            }))
            .await;
            info!(event = %open.event.id, "lobby cancelled: no participants");
        } else {
            info!(event = %open.event.id, participants = open.participants.len(), "handing off to quiz engine");
            quiz.start_round(open.event, open.participants, hub).await;
        }
    }

    /// `join(cid)`. Idempotent.
    pub async fn join(&self, connection_id: ConnectionId) {
        let newly_joined = {
            let mut state = self.state.lock().await;
            let Some(open) = state.open.as_mut() else {
                return;
            };
            open.participants.insert(connection_id.clone())
        };
        let count = self.participant_count().await;
        if newly_joined {
            self.hub
                .emit_to(
                    &connection_id,
                    ServerMessage::lobbyJoined(LobbyRosterPayload {
                        participants: count,
                    }),
                )
                .await;
        }
        self.hub
            .broadcast(ServerMessage::lobbyUpdate(LobbyRosterPayload {
                participants: count,
            }))
            .await;
    }

    /// `leave(cid)`.
    pub async fn leave(&self, connection_id: &ConnectionId) {
        let removed = {
            let mut state = self.state.lock().await;
            let Some(open) = state.open.as_mut() else {
                return;
            };
            open.participants.remove(connection_id)
        };
        if !removed {
            return;
        }
        let count = self.participant_count().await;
        self.hub
            .emit_to(
                connection_id,
                ServerMessage::lobbyLeft(LobbyRosterPayload {
                    participants: count,
                }),
            )
            .await;
        self.hub
            .broadcast(ServerMessage::lobbyUpdate(LobbyRosterPayload {
                participants: count,
            }))
            .await;
    }

    pub async fn remove_if_present(&self, connection_id: &ConnectionId) {
        self.leave(connection_id).await;
    }

    async fn participant_count(&self) -> usize {
        self.state
            .lock()
            .await
            .open
            .as_ref()
            .map_or(0, |open| open.participants.len())
    }

    /// The event record changed while its lobby was open (schedule shifted,
    /// theme changed). Destroy the lobby; recreate it preserving
    /// participants if the new timing still permits.
    pub async fn on_event_updated(&self, updated: Event, reason: &str) {
        let previous = {
            let mut state = self.state.lock().await;
            let Some(open) = state.open.take() else {
                return;
            };
            if open.event.id != updated.id {
                state.open = Some(open);
                return;
            }
            open.ticker.abort();
            open
        };

        self.hub
            .broadcast(ServerMessage::lobbyClosed(LobbyClosedPayload {
                reason: reason.to_owned(),
            }))
            .await;

        let now = Utc::now();
        let lower = updated.start_at - ChronoDuration::seconds(LOBBY_JOIN_WINDOW.as_secs() as i64);
        let upper =
            updated.start_at + ChronoDuration::seconds(LOBBY_RECREATE_WINDOW.as_secs() as i64);
        if now < lower || now > upper {
            return;
        }

        self.open_lobby(updated.clone()).await;
        let mut state = self.state.lock().await;
        if let Some(open) = state.open.as_mut() {
            open.participants = previous.participants;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        question_store::QuestionStore, sessions::SessionRegistry, storage::test_storage_client,
        user_store::UserStore,
    };

    async fn harness() -> (LobbyManager, Arc<EventStore>) {
        let storage = test_storage_client().await;
        let event_store = Arc::new(EventStore::new(storage.clone()));
        let question_store = Arc::new(QuestionStore::new(storage.clone()));
        let user_store = Arc::new(UserStore::new(storage));
        let sessions = SessionRegistry::default();
        let hub = BroadcastHub::new(sessions.clone());
        let quiz = QuizEngine::new(event_store.clone(), question_store, user_store, sessions);
        (
            LobbyManager::new(event_store.clone(), quiz, hub),
            event_store,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn empty_lobby_is_cancelled_at_deadline() {
        let (lobby, event_store) = harness().await;
        let event = Event {
            id: EventId::new(),
            theme: String::new(),
            start_at: Utc::now() + ChronoDuration::seconds(1),
            question_count: 3,
            min_players: 2,
            lobby_open: false,
            is_started: false,
            is_completed: false,
            completed_at: None,
            winner: None,
            next_event_created: false,
        };
        event_store.create(&event).await.unwrap();
        lobby.open_lobby(event.clone()).await;
        assert!(lobby.has_open_lobby().await);

        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let stored = event_store.find_by_id(&event.id).await.unwrap();
        assert!(stored.is_completed);
        assert_eq!(stored.winner.as_deref(), Some("no-winner"));
    }
}
