//! User Store gateway (C3): resolve a user's identity (username, phone) from
//! a user id, and register new players during OTP verification.

use sqlx::Row;
use tracing::warn;

use crate::{
    models::{UserId, UserRecord},
    storage::PersistentStorage,
};

pub struct UserStore {
    storage: PersistentStorage,
}

fn row_to_user(row: &sqlx::any::AnyRow) -> UserRecord {
    UserRecord {
        id: UserId(row.get::<String, _>("id")),
        username: row.get::<String, _>("username"),
        phone_number: row.get::<String, _>("phone_number"),
    }
}

impl UserStore {
    #[must_use]
    pub fn new(storage: PersistentStorage) -> Self {
        Self { storage }
    }

    pub async fn find_by_id(&self, id: &UserId) -> Option<UserRecord> {
        let result = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id.0.clone())
            .fetch_optional(&self.storage.0)
            .await;
        match result {
            Ok(Some(row)) => Some(row_to_user(&row)),
            Ok(None) => None,
            Err(error) => {
                warn!(%error, %id, "find_by_id failed, treating as miss");
                None
            }
        }
    }

    pub async fn find_by_phone(&self, phone_number: &str) -> Option<UserRecord> {
        let result = sqlx::query("SELECT * FROM users WHERE phone_number = ?1")
            .bind(phone_number.to_owned())
            .fetch_optional(&self.storage.0)
            .await;
        match result {
            Ok(Some(row)) => Some(row_to_user(&row)),
            Ok(None) => None,
            Err(error) => {
                warn!(%error, %phone_number, "find_by_phone failed, treating as miss");
                None
            }
        }
    }

    /// Registers a new player on first successful OTP verification, or
    /// returns the existing record when the phone number already has one.
    pub async fn find_or_create_by_phone(
        &self,
        phone_number: &str,
        username: Option<String>,
    ) -> Result<UserRecord, sqlx::Error> {
        if let Some(existing) = self.find_by_phone(phone_number).await {
            return Ok(existing);
        }
        let user = UserRecord {
            id: UserId(uuid::Uuid::new_v4().to_string()),
            username: username.unwrap_or_else(|| format!("player-{}", &phone_number[phone_number.len().saturating_sub(4)..])),
            phone_number: phone_number.to_owned(),
        };
        sqlx::query("INSERT INTO users (id, username, phone_number) VALUES (?1, ?2, ?3)")
            .bind(user.id.0.clone())
            .bind(user.username.clone())
            .bind(user.phone_number.clone())
            .execute(&self.storage.0)
            .await?;
        Ok(user)
    }
}
