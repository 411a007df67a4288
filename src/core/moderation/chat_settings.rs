// Chat settings and membership ledger ports, plus the settings service
// that materializes per-chat defaults.

use super::moderation_models::{ChatSettings, PersistenceError};
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when the chat has never been configured.
    async fn get_settings(&self, chat_id: u64) -> Result<Option<ChatSettings>, PersistenceError>;

    async fn set_settings(
        &self,
        chat_id: u64,
        settings: ChatSettings,
    ) -> Result<(), PersistenceError>;
}

/// Users already confirmed trustworthy in a chat.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn is_member(&self, chat_id: u64, user_id: u64) -> Result<bool, PersistenceError>;

    /// Idempotent: inserting an existing pair is not an error.
    async fn insert_member(&self, chat_id: u64, user_id: u64) -> Result<(), PersistenceError>;
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct ChatSettingsService {
    store: Arc<dyn SettingsStore>,
    /// Chats whose defaults were already written back by this process.
    materialized: DashSet<u64>,
}

impl ChatSettingsService {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            materialized: DashSet::new(),
        }
    }

    /// Settings for a chat, never failing.
    ///
    /// Missing settings are materialized with defaults and written back once.
    /// A read failure returns the defaults without writing anything.
    pub async fn settings_for(&self, chat_id: u64) -> ChatSettings {
        match self.store.get_settings(chat_id).await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let defaults = ChatSettings::default();
                if self.materialized.insert(chat_id) {
                    tracing::debug!(chat_id, "Materializing default chat settings");
                    if let Err(e) = self.store.set_settings(chat_id, defaults.clone()).await {
                        tracing::error!(chat_id, error = %e, "Failed to store default chat settings");
                        self.materialized.remove(&chat_id);
                    }
                }
                defaults
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Failed to read chat settings, using defaults");
                ChatSettings::default()
            }
        }
    }

    /// Read-modify-write of a chat's settings. Returns the stored result.
    pub async fn update(
        &self,
        chat_id: u64,
        apply: impl FnOnce(&mut ChatSettings) + Send,
    ) -> Result<ChatSettings, PersistenceError> {
        let mut settings = self
            .store
            .get_settings(chat_id)
            .await?
            .unwrap_or_default();
        apply(&mut settings);
        self.store.set_settings(chat_id, settings.clone()).await?;
        self.materialized.insert(chat_id);
        Ok(settings)
    }

    pub async fn set_enabled(
        &self,
        chat_id: u64,
        enabled: bool,
    ) -> Result<ChatSettings, PersistenceError> {
        self.update(chat_id, |s| s.enabled = enabled).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
