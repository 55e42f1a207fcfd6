//! Event Store gateway (C1): thin adapter over persistent storage for
//! events. Read failures are logged and mapped to empty results at this
//! boundary — per §4.1, the core stays live when storage is transiently
//! unavailable; write failures are surfaced to the caller untouched.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::warn;

use crate::{
    models::{Event, EventId, EventPatch},
    storage::{PersistentStorage, StorageError},
};

fn row_to_event(row: &sqlx::any::AnyRow) -> Event {
    Event {
        id: EventId(row.get::<String, _>("id")),
        theme: row.get::<String, _>("theme"),
        start_at: row.get::<DateTime<Utc>, _>("start_at"),
        question_count: row.get::<i64, _>("question_count") as usize,
        min_players: row.get::<i64, _>("min_players") as usize,
        lobby_open: row.get::<bool, _>("lobby_open"),
        is_started: row.get::<bool, _>("is_started"),
        is_completed: row.get::<bool, _>("is_completed"),
        completed_at: row.get::<Option<DateTime<Utc>>, _>("completed_at"),
        winner: row.get::<Option<String>, _>("winner"),
        next_event_created: row.get::<bool, _>("next_event_created"),
    }
}

pub struct EventStore {
    storage: PersistentStorage,
}

impl EventStore {
    #[must_use]
    pub fn new(storage: PersistentStorage) -> Self {
        Self { storage }
    }

    pub async fn create(&self, event: &Event) -> Result<(), StorageError> {
        let sql = "INSERT INTO events \
            (id, theme, start_at, question_count, min_players, lobby_open, is_started, \
             is_completed, completed_at, winner, next_event_created) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";
        sqlx::query(sql)
            .bind(event.id.0.clone())
            .bind(event.theme.clone())
            .bind(event.start_at)
            .bind(event.question_count as i64)
            .bind(event.min_players as i64)
            .bind(event.lobby_open)
            .bind(event.is_started)
            .bind(event.is_completed)
            .bind(event.completed_at)
            .bind(event.winner.clone())
            .bind(event.next_event_created)
            .execute(&self.storage.0)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &EventId) -> Option<Event> {
        let result = sqlx::query("SELECT * FROM events WHERE id = ?1")
            .bind(id.0.clone())
            .fetch_optional(&self.storage.0)
            .await;
        match result {
            Ok(row) => row.as_ref().map(row_to_event),
            Err(error) => {
                warn!(%error, %id, "find_by_id failed, treating as miss");
                None
            }
        }
    }

    /// All non-completed events, ordered by `start_at` ascending.
    pub async fn find_active_ordered(&self) -> Vec<Event> {
        self.query_many("SELECT * FROM events WHERE is_completed = false ORDER BY start_at ASC")
            .await
    }

    pub async fn find_upcoming_from_now(&self, now: DateTime<Utc>) -> Vec<Event> {
        let result = sqlx::query(
            "SELECT * FROM events WHERE is_completed = false AND start_at >= ?1 \
             ORDER BY start_at ASC",
        )
        .bind(now)
        .fetch_all(&self.storage.0)
        .await;
        self.rows_or_empty(result, "find_upcoming_from_now")
    }

    pub async fn find_in_window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Event> {
        let result = sqlx::query(
            "SELECT * FROM events WHERE is_completed = false AND start_at >= ?1 AND start_at <= ?2 \
             ORDER BY start_at ASC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.storage.0)
        .await;
        self.rows_or_empty(result, "find_in_window")
    }

    pub async fn find_completed_since(
        &self,
        since: DateTime<Utc>,
        missing_next_flag: bool,
    ) -> Vec<Event> {
        let result = sqlx::query(
            "SELECT * FROM events WHERE is_completed = true AND next_event_created = ?1 \
             AND completed_at >= ?2 ORDER BY start_at ASC",
        )
        .bind(!missing_next_flag)
        .bind(since)
        .fetch_all(&self.storage.0)
        .await;
        self.rows_or_empty(result, "find_completed_since")
    }

    /// Find any non-completed event within ±`tolerance` of `at`, used by the
    /// fill loop's atomic find-or-create-by-minute-bucket check.
    pub async fn find_near(
        &self,
        at: DateTime<Utc>,
        tolerance: chrono::Duration,
    ) -> Option<Event> {
        let from = at - tolerance;
        let to = at + tolerance;
        let result = sqlx::query(
            "SELECT * FROM events WHERE is_completed = false AND start_at >= ?1 AND start_at <= ?2 \
             ORDER BY start_at ASC LIMIT 1",
        )
        .bind(from)
        .bind(to)
        .fetch_optional(&self.storage.0)
        .await;
        match result {
            Ok(row) => row.as_ref().map(row_to_event),
            Err(error) => {
                warn!(%error, "find_near failed, treating as miss");
                None
            }
        }
    }

    pub async fn update(&self, id: &EventId, patch: &EventPatch) -> Result<(), StorageError> {
        // Built incrementally: the teacher's own queries are hand-written
        // per statement rather than via a query builder crate, so this
        // follows suit with one UPDATE per non-empty field set.
        macro_rules! apply {
            ($field:literal, $value:expr) => {
                sqlx::query(concat!("UPDATE events SET ", $field, " = ?1 WHERE id = ?2"))
                    .bind($value)
                    .bind(id.0.clone())
                    .execute(&self.storage.0)
                    .await?;
            };
        }
        if let Some(theme) = patch.theme.clone() {
            apply!("theme", theme);
        }
        if let Some(start_at) = patch.start_at {
            apply!("start_at", start_at);
        }
        if let Some(question_count) = patch.question_count {
            apply!("question_count", question_count as i64);
        }
        if let Some(min_players) = patch.min_players {
            apply!("min_players", min_players as i64);
        }
        if let Some(lobby_open) = patch.lobby_open {
            apply!("lobby_open", lobby_open);
        }
        if let Some(is_started) = patch.is_started {
            apply!("is_started", is_started);
        }
        if let Some(is_completed) = patch.is_completed {
            apply!("is_completed", is_completed);
        }
        if let Some(completed_at) = patch.completed_at {
            apply!("completed_at", completed_at);
        }
        if let Some(winner) = patch.winner.clone() {
            apply!("winner", winner);
        }
        if let Some(next_event_created) = patch.next_event_created {
            apply!("next_event_created", next_event_created);
        }
        Ok(())
    }

    pub async fn delete(&self, id: &EventId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM events WHERE id = ?1")
            .bind(id.0.clone())
            .execute(&self.storage.0)
            .await?;
        Ok(())
    }

    pub async fn delete_bulk(&self, ids: &[EventId]) -> Result<(), StorageError> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    async fn query_many(&self, sql: &str) -> Vec<Event> {
        let result = sqlx::query(sql).fetch_all(&self.storage.0).await;
        self.rows_or_empty(result, sql)
    }

    fn rows_or_empty(
        &self,
        result: Result<Vec<sqlx::any::AnyRow>, sqlx::Error>,
        context: &str,
    ) -> Vec<Event> {
        match result {
            Ok(rows) => rows.iter().map(row_to_event).collect(),
            Err(error) => {
                warn!(%error, %context, "event query failed, returning empty list");
                Vec::new()
            }
        }
    }
}
