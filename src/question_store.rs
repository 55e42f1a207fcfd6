//! Question Store gateway (C2): random sampling and theme-filtered
//! retrieval. Questions are immutable from the core's perspective.

use sqlx::Row;
use tracing::warn;

use crate::{
    models::{Question, QuestionId},
    storage::{PersistentStorage, StorageError},
};

fn row_to_question(row: &sqlx::any::AnyRow) -> Question {
    Question {
        id: crate::models::QuestionId(row.get::<String, _>("id")),
        theme: row.get::<String, _>("theme"),
        question_text: row.get::<String, _>("question_text"),
        responses: [
            row.get::<String, _>("response_1"),
            row.get::<String, _>("response_2"),
            row.get::<String, _>("response_3"),
            row.get::<String, _>("response_4"),
        ],
        correct_response: row.get::<i64, _>("correct_response") as u8,
    }
}

pub struct QuestionStore {
    storage: PersistentStorage,
}

impl QuestionStore {
    #[must_use]
    pub fn new(storage: PersistentStorage) -> Self {
        Self { storage }
    }

    /// Random sample of `count` questions restricted to `theme`, falling
    /// back to a random sample across all themes when `theme` is empty or
    /// yields too few rows.
    pub async fn sample(&self, theme: &str, count: usize) -> Vec<Question> {
        if !theme.is_empty() {
            let themed = self.sample_by_theme(theme, count).await;
            if themed.len() >= count {
                return themed;
            }
        }
        self.sample_any(count).await
    }

    pub async fn sample_by_theme(&self, theme: &str, count: usize) -> Vec<Question> {
        let result = sqlx::query(
            "SELECT * FROM questions WHERE theme = ?1 ORDER BY RANDOM() LIMIT ?2",
        )
        .bind(theme)
        .bind(count as i64)
        .fetch_all(&self.storage.0)
        .await;
        self.rows_or_empty(result)
    }

    pub async fn sample_any(&self, count: usize) -> Vec<Question> {
        let result = sqlx::query("SELECT * FROM questions ORDER BY RANDOM() LIMIT ?1")
            .bind(count as i64)
            .fetch_all(&self.storage.0)
            .await;
        self.rows_or_empty(result)
    }

    pub async fn find_by_theme(&self, theme: &str) -> Vec<Question> {
        let result = sqlx::query("SELECT * FROM questions WHERE theme = ?1")
            .bind(theme)
            .fetch_all(&self.storage.0)
            .await;
        self.rows_or_empty(result)
    }

    pub async fn find_all(&self) -> Vec<Question> {
        let result = sqlx::query("SELECT * FROM questions").fetch_all(&self.storage.0).await;
        self.rows_or_empty(result)
    }

    pub async fn find_by_id(&self, id: &QuestionId) -> Option<Question> {
        let result = sqlx::query("SELECT * FROM questions WHERE id = ?1")
            .bind(id.0.clone())
            .fetch_optional(&self.storage.0)
            .await;
        match result {
            Ok(row) => row.as_ref().map(row_to_question),
            Err(error) => {
                warn!(%error, %id, "find_by_id failed, treating as miss");
                None
            }
        }
    }

    pub async fn create(&self, question: &Question) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO questions \
                (id, theme, question_text, response_1, response_2, response_3, response_4, correct_response) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(question.id.0.clone())
        .bind(question.theme.clone())
        .bind(question.question_text.clone())
        .bind(question.responses[0].clone())
        .bind(question.responses[1].clone())
        .bind(question.responses[2].clone())
        .bind(question.responses[3].clone())
        .bind(question.correct_response as i64)
        .execute(&self.storage.0)
        .await?;
        Ok(())
    }

    pub async fn update(&self, question: &Question) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE questions SET theme = ?1, question_text = ?2, response_1 = ?3, \
             response_2 = ?4, response_3 = ?5, response_4 = ?6, correct_response = ?7 \
             WHERE id = ?8",
        )
        .bind(question.theme.clone())
        .bind(question.question_text.clone())
        .bind(question.responses[0].clone())
        .bind(question.responses[1].clone())
        .bind(question.responses[2].clone())
        .bind(question.responses[3].clone())
        .bind(question.correct_response as i64)
        .bind(question.id.0.clone())
        .execute(&self.storage.0)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &QuestionId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM questions WHERE id = ?1")
            .bind(id.0.clone())
            .execute(&self.storage.0)
            .await?;
        Ok(())
    }

    fn rows_or_empty(&self, result: Result<Vec<sqlx::any::AnyRow>, sqlx::Error>) -> Vec<Question> {
        match result {
            Ok(rows) => rows.iter().map(row_to_question).collect(),
            Err(error) => {
                warn!(%error, "question query failed, returning empty list");
                Vec::new()
            }
        }
    }
}
