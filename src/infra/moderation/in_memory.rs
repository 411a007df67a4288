// In-memory implementation of the settings store and membership ledger.
// Nothing survives a restart, which makes it handy for tests and dry runs.

use crate::core::moderation::{ChatSettings, MembershipStore, PersistenceError, SettingsStore};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

#[derive(Default)]
pub struct InMemoryModerationStore {
    settings: DashMap<u64, ChatSettings>,
    /// (chat_id, user_id)
    members: DashSet<(u64, u64)>,
}

impl InMemoryModerationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemoryModerationStore {
    async fn get_settings(&self, chat_id: u64) -> Result<Option<ChatSettings>, PersistenceError> {
        Ok(self.settings.get(&chat_id).map(|s| s.clone()))
    }

    async fn set_settings(
        &self,
        chat_id: u64,
        settings: ChatSettings,
    ) -> Result<(), PersistenceError> {
        self.settings.insert(chat_id, settings);
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for InMemoryModerationStore {
    async fn is_member(&self, chat_id: u64, user_id: u64) -> Result<bool, PersistenceError> {
        Ok(self.members.contains(&(chat_id, user_id)))
    }

    async fn insert_member(&self, chat_id: u64, user_id: u64) -> Result<(), PersistenceError> {
        self.members.insert((chat_id, user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryModerationStore::new();

        assert!(store.get_settings(1).await.unwrap().is_none());
        store.set_settings(1, ChatSettings::default()).await.unwrap();
        assert_eq!(
            store.get_settings(1).await.unwrap(),
            Some(ChatSettings::default())
        );

        store.insert_member(1, 2).await.unwrap();
        store.insert_member(1, 2).await.unwrap();
        assert!(store.is_member(1, 2).await.unwrap());
        assert!(!store.is_member(1, 3).await.unwrap());
    }
}
