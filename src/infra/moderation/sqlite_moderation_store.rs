// SQLite-backed store for chat settings and the membership ledger.
//
// Tables:
// - chat_settings: Per-chat gatekeeper configuration
// - chat_members: Users whose first message passed classification

use crate::core::moderation::{ChatSettings, MembershipStore, PersistenceError, SettingsStore};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

fn storage_error(e: sqlx::Error) -> PersistenceError {
    PersistenceError::StorageError(e.to_string())
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and run migrations.
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}?mode=rwc", path))
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_settings (
                chat_id INTEGER PRIMARY KEY,
                enabled BOOLEAN NOT NULL DEFAULT 1,
                challenge_timeout_secs INTEGER NOT NULL DEFAULT 60,
                ban_timeout_secs INTEGER NOT NULL DEFAULT 600,
                language TEXT NOT NULL DEFAULT 'en'
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_members (
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteModerationStore {
    async fn get_settings(&self, chat_id: u64) -> Result<Option<ChatSettings>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM chat_settings WHERE chat_id = ?")
            .bind(chat_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|row| ChatSettings {
            enabled: row.get("enabled"),
            challenge_timeout_secs: row.get::<i64, _>("challenge_timeout_secs") as u64,
            ban_timeout_secs: row.get::<i64, _>("ban_timeout_secs") as u64,
            language: row.get("language"),
        }))
    }

    async fn set_settings(
        &self,
        chat_id: u64,
        settings: ChatSettings,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO chat_settings (
                chat_id, enabled, challenge_timeout_secs, ban_timeout_secs, language
            )
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                enabled = excluded.enabled,
                challenge_timeout_secs = excluded.challenge_timeout_secs,
                ban_timeout_secs = excluded.ban_timeout_secs,
                language = excluded.language
            "#,
        )
        .bind(chat_id as i64)
        .bind(settings.enabled)
        .bind(settings.challenge_timeout_secs as i64)
        .bind(settings.ban_timeout_secs as i64)
        .bind(&settings.language)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for SqliteModerationStore {
    async fn is_member(&self, chat_id: u64, user_id: u64) -> Result<bool, PersistenceError> {
        let row = sqlx::query("SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id as i64)
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.is_some())
    }

    async fn insert_member(&self, chat_id: u64, user_id: u64) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO chat_members (chat_id, user_id, joined_at)
            VALUES (?, ?, ?)
            ON CONFLICT(chat_id, user_id) DO NOTHING
            "#,
        )
        .bind(chat_id as i64)
        .bind(user_id as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}
