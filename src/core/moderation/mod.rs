// Core moderation module - the admission pipeline.
// Following the same layout as the other core modules: models, ports, services.

pub mod admission_classifier;
pub mod captcha;
pub mod challenge_coordinator;
pub mod chat_settings;
pub mod moderation_actions;
pub mod moderation_models;
pub mod pipeline;
pub mod reaction_flood;
pub mod spam_classifier;

pub use admission_classifier::AdmissionClassifier;
pub use challenge_coordinator::{ChallengeCoordinator, ChallengeError};
pub use chat_settings::{ChatSettingsService, MembershipStore, SettingsStore};
pub use moderation_actions::{ChatTransport, ModerationActions};
pub use moderation_models::*;
pub use pipeline::ModerationPipeline;
pub use reaction_flood::ReactionFloodDetector;
pub use spam_classifier::{LlmSpamClassifier, ReputationSource, ReputationVerdict, SpamClassifier};
