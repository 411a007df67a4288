// Discord layer - turns gateway events into chat events and implements the
// chat transport on top of serenity's HTTP client.

#[path = "moderation/mod.rs"]
pub mod moderation;
pub mod presence;

use crate::core::moderation::ModerationPipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub pipeline: Arc<ModerationPipeline>,
    /// Cancelled on shutdown. Spawned handlers run under child tokens.
    pub shutdown: CancellationToken,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
