// Routes each chat event to the component that owns it.

use super::admission_classifier::AdmissionClassifier;
use super::challenge_coordinator::{ChallengeCoordinator, ChallengeError};
use super::chat_settings::{ChatSettingsService, MembershipStore};
use super::moderation_actions::ModerationActions;
use super::moderation_models::{ChatEvent, PipelineOutcome};
use super::reaction_flood::ReactionFloodDetector;
use super::spam_classifier::{ReputationSource, SpamClassifier};
use crate::core::i18n::Language;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ModerationPipeline {
    settings: Arc<ChatSettingsService>,
    challenges: ChallengeCoordinator,
    admission: AdmissionClassifier,
    reactions: ReactionFloodDetector,
}

impl ModerationPipeline {
    pub fn new(
        actions: ModerationActions,
        settings: Arc<ChatSettingsService>,
        ledger: Arc<dyn MembershipStore>,
        reputation: Arc<dyn ReputationSource>,
        classifier: Arc<dyn SpamClassifier>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            challenges: ChallengeCoordinator::new(actions.clone(), Arc::clone(&settings)),
            admission: AdmissionClassifier::new(
                actions.clone(),
                ledger,
                Arc::clone(&settings),
                reputation,
                classifier,
            )
            .with_call_timeout(call_timeout),
            reactions: ReactionFloodDetector::new(actions),
            settings,
        }
    }

    pub fn settings(&self) -> &ChatSettingsService {
        &self.settings
    }

    pub async fn language_for(&self, chat_id: u64) -> Language {
        Language::from_tag(&self.settings.settings_for(chat_id).await.language)
    }

    /// Handle one event. Join events return only after the whole batch is resolved.
    pub async fn dispatch(
        &self,
        event: ChatEvent,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, ChallengeError> {
        // Answers belong to a batch that is already running.
        if let ChatEvent::ChallengeAnswer {
            chat_id,
            user_id,
            token,
        } = &event
        {
            let outcome = self.challenges.on_challenge_answer(*chat_id, *user_id, token);
            return Ok(PipelineOutcome::Answer(outcome));
        }

        let chat_id = match &event {
            ChatEvent::Join { chat_id, .. }
            | ChatEvent::Message { chat_id, .. }
            | ChatEvent::Reaction { chat_id, .. }
            | ChatEvent::ChallengeAnswer { chat_id, .. } => *chat_id,
        };

        if !self.settings.settings_for(chat_id).await.enabled {
            tracing::debug!(chat_id, "Moderation disabled for this chat");
            return Ok(PipelineOutcome::Disabled);
        }

        let outcome = match event {
            ChatEvent::Join { chat_id, joiners } => PipelineOutcome::Challenge(
                self.challenges
                    .on_members_joined(chat_id, joiners, cancel)
                    .await?,
            ),
            ChatEvent::Message {
                chat_id,
                user_id,
                message,
            } => PipelineOutcome::Admission(
                self.admission
                    .classify_first_message(chat_id, user_id, &message, cancel)
                    .await,
            ),
            ChatEvent::Reaction {
                chat_id,
                user_id,
                message,
                reactions,
            } => PipelineOutcome::Reaction(
                self.reactions
                    .on_reaction(chat_id, user_id, message, &reactions)
                    .await,
            ),
            ChatEvent::ChallengeAnswer { .. } => PipelineOutcome::Ignored,
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_actions::test_support::RecordingTransport;
    use crate::core::moderation::moderation_models::{
        ClassificationError, Decision, IncomingMessage, JoiningUser, MessageRef, ReactionKind,
    };
    use crate::core::moderation::spam_classifier::{ReputationVerdict, SPAM_SENTINEL};
    use crate::infra::moderation::InMemoryModerationStore;
    use async_trait::async_trait;

    struct CleanReputation;

    #[async_trait]
    impl ReputationSource for CleanReputation {
        async fn lookup(&self, _user_id: u64) -> Result<ReputationVerdict, ClassificationError> {
            Ok(ReputationVerdict::default())
        }
    }

    struct AlwaysSpam;

    #[async_trait]
    impl SpamClassifier for AlwaysSpam {
        async fn classify(&self, _text: &str) -> Result<String, ClassificationError> {
            Ok(SPAM_SENTINEL.to_string())
        }
    }

    fn pipeline(transport: Arc<RecordingTransport>) -> ModerationPipeline {
        let store = Arc::new(InMemoryModerationStore::new());
        ModerationPipeline::new(
            ModerationActions::new(transport),
            Arc::new(ChatSettingsService::new(store.clone())),
            store,
            Arc::new(CleanReputation),
            Arc::new(AlwaysSpam),
            Duration::from_secs(1),
        )
    }

    fn spam_event(chat_id: u64) -> ChatEvent {
        ChatEvent::Message {
            chat_id,
            user_id: 5,
            message: IncomingMessage {
                message: MessageRef {
                    channel_id: 1,
                    message_id: 2,
                },
                author_name: "Spammer".to_string(),
                text: Some("free crypto".to_string()),
                caption: None,
            },
        }
    }

    #[tokio::test]
    async fn test_message_routed_to_admission() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline(transport.clone());

        let outcome = pipeline
            .dispatch(spam_event(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, PipelineOutcome::Admission(Decision::Banned));
        assert_eq!(transport.bans().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_chat_is_silent() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline(transport.clone());
        pipeline.settings().set_enabled(1, false).await.unwrap();

        let cancel = CancellationToken::new();
        let events = vec![
            spam_event(1),
            ChatEvent::Join {
                chat_id: 1,
                joiners: vec![JoiningUser {
                    user_id: 5,
                    display_name: "Ann".to_string(),
                    is_bot: false,
                }],
            },
            ChatEvent::Reaction {
                chat_id: 1,
                user_id: 5,
                message: MessageRef {
                    channel_id: 1,
                    message_id: 2,
                },
                reactions: vec![ReactionKind::Emoji("💩".to_string())],
            },
        ];
        for event in events {
            assert_eq!(
                pipeline.dispatch(event, &cancel).await.unwrap(),
                PipelineOutcome::Disabled
            );
        }
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stray_answer_reports_not_challenged() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = pipeline(transport.clone());

        let outcome = pipeline
            .dispatch(
                ChatEvent::ChallengeAnswer {
                    chat_id: 1,
                    user_id: 5,
                    token: "gk:abc:def".to_string(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Answer(crate::core::moderation::AnswerOutcome::NotChallenged)
        );
    }
}
