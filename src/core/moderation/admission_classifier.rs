// First-message admission chain.
//
// Stages, each able to short-circuit:
// 1. ledger membership -> Allow
// 2. reputation lookup, banned=true -> ban path
// 3. LLM classification of text/caption, exact "SPAM" -> ban path
// 4. ban path: delete + ban, notice if either failed
// 5. allow path: record the member
//
// Classification is fail-open: any lookup or classifier failure counts as "no evidence".

use super::chat_settings::{ChatSettingsService, MembershipStore};
use super::moderation_actions::ModerationActions;
use super::moderation_models::{
    ClassificationError, Decision, IncomingMessage, ModerationOutcome, OutgoingMessage,
};
use super::spam_classifier::{ReputationSource, SpamClassifier, SPAM_SENTINEL};
use crate::core::i18n::{render, translate, Language, Phrase};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AdmissionClassifier {
    actions: ModerationActions,
    ledger: Arc<dyn MembershipStore>,
    settings: Arc<ChatSettingsService>,
    reputation: Arc<dyn ReputationSource>,
    classifier: Arc<dyn SpamClassifier>,
    call_timeout: Duration,
}

impl AdmissionClassifier {
    pub fn new(
        actions: ModerationActions,
        ledger: Arc<dyn MembershipStore>,
        settings: Arc<ChatSettingsService>,
        reputation: Arc<dyn ReputationSource>,
        classifier: Arc<dyn SpamClassifier>,
    ) -> Self {
        Self {
            actions,
            ledger,
            settings,
            reputation,
            classifier,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub async fn classify_first_message(
        &self,
        chat_id: u64,
        user_id: u64,
        message: &IncomingMessage,
        cancel: &CancellationToken,
    ) -> Decision {
        match self.ledger.is_member(chat_id, user_id).await {
            Ok(true) => return Decision::Allow,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(chat_id, user_id, error = %e, "Ledger read failed, classifying anyway");
            }
        }

        match self
            .guarded(cancel, self.reputation.lookup(user_id))
            .await
        {
            Ok(verdict) if verdict.banned => {
                tracing::info!(
                    chat_id,
                    user_id,
                    offenses = verdict.offenses,
                    spam_factor = verdict.spam_factor,
                    "Reputation service reports known spammer"
                );
                return self.ban_spammer(chat_id, user_id, message).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(chat_id, user_id, error = %e, "Reputation lookup failed, continuing");
            }
        }

        match message.content() {
            None => {
                tracing::debug!(chat_id, user_id, "No text to classify, letting message through");
            }
            Some(content) => match self.guarded(cancel, self.classifier.classify(content)).await {
                Ok(verdict) if verdict == SPAM_SENTINEL => {
                    tracing::info!(chat_id, user_id, "Classifier flagged first message as spam");
                    return self.ban_spammer(chat_id, user_id, message).await;
                }
                Ok(verdict) => {
                    tracing::debug!(chat_id, user_id, verdict = %verdict, "Message passed classifier");
                }
                Err(e) => {
                    tracing::warn!(chat_id, user_id, error = %e, "Classifier call failed, failing open");
                }
            },
        }

        match self.ledger.insert_member(chat_id, user_id).await {
            Ok(()) => {
                tracing::info!(chat_id, user_id, "First message passed, user added to members");
                Decision::Allow
            }
            Err(e) => {
                tracing::error!(chat_id, user_id, error = %e, "Failed to record member");
                Decision::Error
            }
        }
    }

    /// Run one external call under the event's cancellation and the per-call timeout.
    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        call: impl Future<Output = Result<T, ClassificationError>>,
    ) -> Result<T, ClassificationError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ClassificationError::Cancelled),
            result = tokio::time::timeout(self.call_timeout, call) => {
                result.unwrap_or(Err(ClassificationError::TimedOut(self.call_timeout)))
            }
        }
    }

    async fn ban_spammer(
        &self,
        chat_id: u64,
        user_id: u64,
        message: &IncomingMessage,
    ) -> Decision {
        let mut outcome = self
            .actions
            .ban_and_delete(chat_id, user_id, message.message)
            .await;

        if !outcome.fully_applied() {
            let settings = self.settings.settings_for(chat_id).await;
            let lang = Language::from_tag(&settings.language);
            let notice = permission_notice(&outcome, &message.author_name, lang);

            let sent = self
                .actions
                .send(OutgoingMessage {
                    chat_id,
                    channel_id: Some(message.message.channel_id),
                    text: notice.clone(),
                    options: Vec::new(),
                })
                .await;
            if sent.is_ok() {
                outcome.notice = Some(notice);
            }
        }

        tracing::info!(chat_id, user_id, outcome = ?outcome, "Spammer handled");
        Decision::Banned
    }
}

/// Localized notice naming the permission that was missing.
fn permission_notice(outcome: &ModerationOutcome, name: &str, lang: Language) -> String {
    let phrase = match (outcome.delete_ok, outcome.ban_ok) {
        (Some(false), Some(false)) => Phrase::CannotDeleteOrBan,
        (Some(false), _) => Phrase::CannotDelete,
        _ => Phrase::CannotBan,
    };
    format!(
        "{} {}",
        render(phrase, lang, &[("name", name)]),
        translate(Phrase::NeedPermissions, lang)
    )
}

// ============================================================================
// TESTS
// ============================================================================
