// External judgments about a user: the reputation lookup and the LLM text classifier.

use super::moderation_models::ClassificationError;
use crate::core::ai::{AiConfig, AiProvider, AiService};
use async_trait::async_trait;

/// The only classifier output that means "spam".
pub const SPAM_SENTINEL: &str = "SPAM";
pub const NOT_SPAM_TOKEN: &str = "NOT_SPAM";

pub const SPAM_DETECTION_PROMPT: &str = "\
You are a spam detection system for group chats. \
Answer 'SPAM' if the message is spam, or 'NOT_SPAM' if it is not. \
Do not provide any other information. \
Pay special attention to offers of easy income, remote job recruiting and \
cryptocurrency schemes: they are almost always spam. Spammers like to mix \
Cyrillic and Latin letters to fool filters, treat such messages with extra suspicion.

Examples:
Message: Hi everyone, does anyone know how to configure the proxy in version 2?
Answer: NOT_SPAM
Message: Еarn $500 a day from hоme, no experience needed! Write me in DM
Answer: SPAM
Message: Looking for 3 people for a remote project, crypto trading, 20% daily profit
Answer: SPAM
Message: thanks, that fixed it
Answer: NOT_SPAM";

// ============================================================================
// REPUTATION (PORT)
// ============================================================================

/// What an external reputation service knows about a user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReputationVerdict {
    /// Authoritative "known spammer" flag
    pub banned: bool,
    pub offenses: u32,
    pub spam_factor: f64,
}

#[async_trait]
pub trait ReputationSource: Send + Sync {
    async fn lookup(&self, user_id: u64) -> Result<ReputationVerdict, ClassificationError>;
}

// ============================================================================
// CLASSIFIER (PORT)
// ============================================================================

#[async_trait]
pub trait SpamClassifier: Send + Sync {
    /// Raw classifier output. Only an exact `SPAM_SENTINEL` means spam.
    async fn classify(&self, text: &str) -> Result<String, ClassificationError>;
}

/// Classifier backed by a chat-completion model with a fixed few-shot prompt.
pub struct LlmSpamClassifier<P: AiProvider> {
    ai: AiService<P>,
}

impl<P: AiProvider> LlmSpamClassifier<P> {
    pub fn new(provider: P, model: String) -> Self {
        let config = AiConfig {
            model,
            temperature: 0.0,
            max_tokens: Some(5),
        };
        Self {
            ai: AiService::new(provider, SPAM_DETECTION_PROMPT.to_string(), config),
        }
    }
}

#[async_trait]
impl<P: AiProvider> SpamClassifier for LlmSpamClassifier<P> {
    async fn classify(&self, text: &str) -> Result<String, ClassificationError> {
        tracing::debug!(model = self.ai.model(), "Sending message to spam classifier");
        self.ai
            .complete(text)
            .await
            .map_err(|e| ClassificationError::Request(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::AiMessage;
    use std::error::Error;

    struct FixedProvider(Result<&'static str, &'static str>);

    #[async_trait]
    impl AiProvider for FixedProvider {
        async fn chat_complete(
            &self,
            messages: &[AiMessage],
            config: &AiConfig,
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            assert_eq!(messages[0].content, SPAM_DETECTION_PROMPT);
            assert_eq!(config.temperature, 0.0);
            self.0.map(str::to_string).map_err(|e| e.into())
        }
    }

    #[tokio::test]
    async fn test_classifier_returns_trimmed_output() {
        let classifier = LlmSpamClassifier::new(FixedProvider(Ok("SPAM\n")), "m".to_string());
        assert_eq!(classifier.classify("buy now").await.unwrap(), SPAM_SENTINEL);
    }

    #[tokio::test]
    async fn test_classifier_failure_maps_to_request_error() {
        let classifier = LlmSpamClassifier::new(FixedProvider(Err("503")), "m".to_string());
        let err = classifier.classify("hello").await.unwrap_err();
        assert!(matches!(err, ClassificationError::Request(msg) if msg.contains("503")));
    }
}
