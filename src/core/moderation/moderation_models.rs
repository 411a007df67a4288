// Moderation domain models - data structures for the admission pipeline.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts incoming events into `ChatEvent` and
// turns `ModerationOutcome` back into chat notices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// A chat transport call failed (usually missing admin rights).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Missing permission: {0}")]
    MissingPermission(String),

    #[error("Chat has no channel to post into")]
    NoChannel,

    #[error("Transport error: {0}")]
    Api(String),
}

/// A reputation or classifier call failed, or returned something unreadable.
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Call timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Call cancelled")]
    Cancelled,
}

/// Ledger or settings store failure.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// TRANSPORT SHAPES
// ============================================================================

/// Address of a message inside a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// One inline option attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOption {
    pub label: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: u64,
    /// `None` posts into the chat's default channel.
    pub channel_id: Option<u64>,
    pub text: String,
    pub options: Vec<PromptOption>,
}

/// What a restricted member may still do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestrictPermissions {
    pub can_send_messages: bool,
    pub can_send_media: bool,
}

impl RestrictPermissions {
    /// Text only, no media.
    pub fn media_lockdown() -> Self {
        Self {
            can_send_messages: true,
            can_send_media: false,
        }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoiningUser {
    pub user_id: u64,
    pub display_name: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message: MessageRef,
    pub author_name: String,
    pub text: Option<String>,
    pub caption: Option<String>,
}

impl IncomingMessage {
    /// Text if present, otherwise caption. Blank content counts as none.
    pub fn content(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.caption.as_deref().filter(|c| !c.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionKind {
    Emoji(String),
    /// Platform-specific custom emoji id, resolved through the transport.
    Custom(u64),
}

/// Every event the pipeline understands, decided once at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Join {
        chat_id: u64,
        joiners: Vec<JoiningUser>,
    },
    Message {
        chat_id: u64,
        user_id: u64,
        message: IncomingMessage,
    },
    Reaction {
        chat_id: u64,
        user_id: u64,
        message: MessageRef,
        reactions: Vec<ReactionKind>,
    },
    ChallengeAnswer {
        chat_id: u64,
        user_id: u64,
        token: String,
    },
}

// ============================================================================
// CHALLENGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeStatus {
    Pending,
    Succeeded,
    TimedOut,
}

impl ChallengeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ChallengeStatus::Pending)
    }
}

/// One captcha button: a glyph plus its localized name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaOption {
    pub glyph: String,
    pub label: String,
}

/// Result of a button press, reported back to whoever pressed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Accepted,
    Incorrect,
    NotChallenged,
    Expired,
}

/// Summary of a finished join batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub chat_id: u64,
    pub succeeded: Vec<u64>,
    pub timed_out: Vec<u64>,
    pub prompt_deleted: bool,
}

// ============================================================================
// ADMISSION / OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Banned,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModerationAction {
    #[default]
    None,
    Restrict,
    Ban,
    BanAndDelete,
}

/// What the moderation layer did, with each sub-operation reported on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModerationOutcome {
    pub action: ModerationAction,
    pub ban_ok: Option<bool>,
    pub delete_ok: Option<bool>,
    pub restrict_ok: Option<bool>,
    /// Localized notice posted to the chat, if any.
    pub notice: Option<String>,
}

impl ModerationOutcome {
    pub fn fully_applied(&self) -> bool {
        [self.ban_ok, self.delete_ok, self.restrict_ok]
            .iter()
            .all(|r| r.unwrap_or(true))
    }
}

/// What the pipeline did with one event, mainly for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Ignored,
    Disabled,
    Challenge(BatchReport),
    Answer(AnswerOutcome),
    Admission(Decision),
    Reaction(Option<ModerationOutcome>),
}

// ============================================================================
// SETTINGS / TALLY
// ============================================================================

pub const DEFAULT_CHALLENGE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_BAN_TIMEOUT_SECS: u64 = 10 * 60;
pub const DEFAULT_LANGUAGE: &str = "en";

/// Per-chat configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub enabled: bool,
    /// How long a joiner has to answer the captcha (seconds)
    pub challenge_timeout_secs: u64,
    /// How long a banned user stays out (seconds)
    pub ban_timeout_secs: u64,
    pub language: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            challenge_timeout_secs: DEFAULT_CHALLENGE_TIMEOUT_SECS,
            ban_timeout_secs: DEFAULT_BAN_TIMEOUT_SECS,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl ChatSettings {
    /// Zero means "unset" and falls back to the default.
    pub fn challenge_timeout(&self) -> Duration {
        match self.challenge_timeout_secs {
            0 => Duration::from_secs(DEFAULT_CHALLENGE_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn ban_timeout(&self) -> Duration {
        match self.ban_timeout_secs {
            0 => Duration::from_secs(DEFAULT_BAN_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

/// One flagged reaction occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedReaction {
    pub message: MessageRef,
    pub glyph: String,
    pub at: DateTime<Utc>,
}

/// Flagged reactions recorded for a user in a chat.
#[derive(Debug, Clone, Default)]
pub struct ReactionTally {
    pub occurrences: Vec<FlaggedReaction>,
}

impl ReactionTally {
    pub fn count(&self) -> usize {
        self.occurrences.len()
    }

    /// Drop occurrences older than `since`.
    pub fn prune(&mut self, since: DateTime<Utc>) {
        self.occurrences.retain(|o| o.at >= since);
    }
}
