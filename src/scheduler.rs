//! Event Scheduler (C4): four cooperative periodic loops, each single-flight
//! via `Mutex::try_lock` (concurrent ticks skip rather than queue), grounded
//! on the teacher's `clear_lobby_on_interval`/`clear_queue_on_interval` loop
//! shape.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Parser;
use tokio::{sync::Mutex, time::interval};
use tracing::{debug, info, warn};

use crate::{
    constants::{
        EXPIRY_LOOP_INTERVAL, FILL_BUCKET_TOLERANCE, FILL_HORIZON, FILL_LOOP_INTERVAL,
        FILL_SPACING, LOBBY_OPEN_LOOP_INTERVAL, LOBBY_OPEN_WINDOW, ROLLOVER_LOOKBACK,
        ROLLOVER_LOOP_INTERVAL, ROLLOVER_SPACING,
    },
    event_store::EventStore,
    lobby::LobbyManager,
    models::{Event, EventId, EventPatch},
    quiz::QuizEngine,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Parser)]
pub struct Options {
    /// Fill-loop period, in seconds.
    #[clap(long, env, default_value = "60")]
    pub fill_interval_secs: u64,

    /// Lobby-open-loop period, in seconds.
    #[clap(long, env, default_value = "30")]
    pub lobby_open_interval_secs: u64,

    /// Completion-rollover-loop period, in seconds.
    #[clap(long, env, default_value = "30")]
    pub rollover_interval_secs: u64,

    /// Expiry-loop period, in seconds.
    #[clap(long, env, default_value = "30")]
    pub expiry_interval_secs: u64,
}

#[derive(Clone)]
pub struct Scheduler {
    event_store: Arc<EventStore>,
    lobby: LobbyManager,
    quiz: QuizEngine,
    fill_lock: Arc<Mutex<()>>,
    lobby_open_lock: Arc<Mutex<()>>,
    rollover_lock: Arc<Mutex<()>>,
    expiry_lock: Arc<Mutex<()>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(event_store: Arc<EventStore>, lobby: LobbyManager, quiz: QuizEngine) -> Self {
        Self {
            event_store,
            lobby,
            quiz,
            fill_lock: Arc::new(Mutex::new(())),
            lobby_open_lock: Arc::new(Mutex::new(())),
            rollover_lock: Arc::new(Mutex::new(())),
            expiry_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Spawns the four loops plus a one-time startup de-duplication pass.
    pub fn spawn_all(&self, options: &Options) {
        let this = self.clone();
        tokio::spawn(async move { this.deduplicate_upcoming().await });

        let this = self.clone();
        let period = std::time::Duration::from_secs(options.fill_interval_secs);
        tokio::spawn(async move { this.fill_loop(period).await });

        let this = self.clone();
        let period = std::time::Duration::from_secs(options.lobby_open_interval_secs);
        tokio::spawn(async move { this.lobby_open_loop(period).await });

        let this = self.clone();
        let period = std::time::Duration::from_secs(options.rollover_interval_secs);
        tokio::spawn(async move { this.rollover_loop(period).await });

        let this = self.clone();
        let period = std::time::Duration::from_secs(options.expiry_interval_secs);
        tokio::spawn(async move { this.expiry_loop(period).await });
    }

    /// Within each 1-minute bucket of upcoming events, keep the earliest and
    /// delete the rest.
    async fn deduplicate_upcoming(&self) {
        let upcoming = self.event_store.find_upcoming_from_now(Utc::now()).await;
        let mut seen_buckets: std::collections::HashMap<i64, EventId> = std::collections::HashMap::new();
        let mut duplicates = Vec::new();
        for event in upcoming {
            let bucket = event.start_at.timestamp() / 60;
            match seen_buckets.get(&bucket) {
                Some(_) => duplicates.push(event.id),
                None => {
                    seen_buckets.insert(bucket, event.id);
                }
            }
        }
        if duplicates.is_empty() {
            return;
        }
        info!(count = duplicates.len(), "deduplicating upcoming events at startup");
        if let Err(error) = self.event_store.delete_bulk(&duplicates).await {
            warn!(%error, "failed to delete duplicate upcoming events");
        }
    }

    async fn fill_loop(&self, period: std::time::Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let Ok(_guard) = self.fill_lock.try_lock() else {
                debug!("fill loop: previous tick still running, skipping");
                continue;
            };
            if self.quiz.is_round_live().await {
                continue;
            }
            self.fill_tick().await;
        }
    }

    async fn fill_tick(&self) {
        let now = Utc::now();
        let horizon = now + ChronoDuration::seconds(FILL_HORIZON.as_secs() as i64);
        let spacing = ChronoDuration::seconds(FILL_SPACING.as_secs() as i64);
        let tolerance = ChronoDuration::seconds(FILL_BUCKET_TOLERANCE.as_secs() as i64);

        let mut cursor = now;
        while cursor <= horizon {
            if self.event_store.find_near(cursor, tolerance).await.is_none() {
                let event = Event {
                    id: EventId::new(),
                    theme: String::new(),
                    start_at: cursor,
                    question_count: crate::constants::DEFAULT_QUESTION_COUNT,
                    min_players: crate::constants::DEFAULT_MIN_PLAYERS,
                    lobby_open: false,
                    is_started: false,
                    is_completed: false,
                    completed_at: None,
                    winner: None,
                    next_event_created: false,
                };
                if let Err(error) = self.event_store.create(&event).await {
                    warn!(%error, "fill loop: failed to create auto event");
                } else {
                    debug!(event = %event.id, start_at = %cursor, "created auto event");
                }
            }
            cursor += spacing;
        }
    }

    async fn lobby_open_loop(&self, period: std::time::Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let Ok(_guard) = self.lobby_open_lock.try_lock() else {
                debug!("lobby-open loop: previous tick still running, skipping");
                continue;
            };
            let now = Utc::now();
            let window_end = now + ChronoDuration::seconds(LOBBY_OPEN_WINDOW.as_secs() as i64);
            for event in self.event_store.find_in_window(now, window_end).await {
                if event.lobby_open {
                    continue;
                }
                self.lobby.open_lobby(event).await;
            }
        }
    }

    async fn rollover_loop(&self, period: std::time::Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let Ok(_guard) = self.rollover_lock.try_lock() else {
                debug!("rollover loop: previous tick still running, skipping");
                continue;
            };
            if self.quiz.is_round_live().await {
                continue;
            }
            let now = Utc::now();
            let since = now - ChronoDuration::seconds(ROLLOVER_LOOKBACK.as_secs() as i64);
            for event in self.event_store.find_completed_since(since, true).await {
                let Some(completed_at) = event.completed_at else {
                    continue;
                };
                let min_start = now + ChronoDuration::seconds(60);
                let proposed = completed_at + ChronoDuration::seconds(ROLLOVER_SPACING.as_secs() as i64);
                let start_at = proposed.max(min_start);

                let successor = Event {
                    id: EventId::new(),
                    theme: event.theme.clone(),
                    start_at,
                    question_count: event.question_count,
                    min_players: event.min_players,
                    lobby_open: false,
                    is_started: false,
                    is_completed: false,
                    completed_at: None,
                    winner: None,
                    next_event_created: false,
                };
                if let Err(error) = self.event_store.create(&successor).await {
                    warn!(%error, predecessor = %event.id, "rollover: failed to create successor event");
                    continue;
                }
                if let Err(error) = self
                    .event_store
                    .update(
                        &event.id,
                        &EventPatch {
                            next_event_created: Some(true),
                            ..EventPatch::default()
                        },
                    )
                    .await
                {
                    warn!(%error, predecessor = %event.id, "rollover: failed to mark next_event_created");
                }
                info!(predecessor = %event.id, successor = %successor.id, "rolled over completed event");
            }
        }
    }

    async fn expiry_loop(&self, period: std::time::Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let Ok(_guard) = self.expiry_lock.try_lock() else {
                debug!("expiry loop: previous tick still running, skipping");
                continue;
            };
            if self.quiz.is_round_live().await {
                continue;
            }
            let now: DateTime<Utc> = Utc::now();
            for event in self.event_store.find_active_ordered().await {
                if event.start_at > now {
                    continue;
                }
                if let Err(error) = self
                    .event_store
                    .update(
                        &event.id,
                        &EventPatch {
                            is_completed: Some(true),
                            completed_at: Some(Some(now)),
                            next_event_created: Some(false),
                            ..EventPatch::default()
                        },
                    )
                    .await
                {
                    warn!(%error, event = %event.id, "expiry loop: failed to mark event completed");
                } else {
                    info!(event = %event.id, "expired stale non-completed event");
                }
            }
        }
    }
}
