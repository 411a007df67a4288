// Implementations of the moderation ports.

pub mod in_memory;
pub mod lols_client;
pub mod sqlite_moderation_store;

pub use in_memory::InMemoryModerationStore;
pub use lols_client::{LolsReputationClient, DEFAULT_REPUTATION_URL};
pub use sqlite_moderation_store::SqliteModerationStore;
