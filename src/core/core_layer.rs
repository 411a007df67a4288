// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "i18n/mod.rs"]
pub mod i18n;

#[path = "moderation/mod.rs"]
pub mod moderation;
