use super::models::{AiConfig, AiMessage};
use async_trait::async_trait;
use std::error::Error;

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends a chat completion request and returns the first choice's content.
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// A provider bound to one system prompt and one model configuration.
pub struct AiService<P: AiProvider> {
    provider: P,
    system_prompt: String,
    config: AiConfig,
}

impl<P: AiProvider> AiService<P> {
    pub fn new(provider: P, system_prompt: String, config: AiConfig) -> Self {
        Self {
            provider,
            system_prompt,
            config,
        }
    }

    /// System prompt + a single user message, answer trimmed.
    pub async fn complete(&self, user_text: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let messages = [
            AiMessage::system(self.system_prompt.clone()),
            AiMessage::user(user_text),
        ];

        let answer = self.provider.chat_complete(&messages, &self.config).await?;
        Ok(answer.trim().to_string())
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoProvider {
        seen: Mutex<Vec<AiMessage>>,
    }

    #[async_trait]
    impl AiProvider for EchoProvider {
        async fn chat_complete(
            &self,
            messages: &[AiMessage],
            _config: &AiConfig,
        ) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.seen.lock().unwrap().extend(messages.iter().cloned());
            Ok(format!("  {}\n", messages[1].content))
        }
    }

    #[tokio::test]
    async fn test_complete_prepends_system_prompt_and_trims() {
        let provider = EchoProvider {
            seen: Mutex::new(Vec::new()),
        };
        let service = AiService::new(
            provider,
            "be terse".to_string(),
            AiConfig {
                model: "test-model".to_string(),
                temperature: 0.0,
                max_tokens: Some(5),
            },
        );

        let answer = service.complete("hello").await.unwrap();

        assert_eq!(answer, "hello");
        let seen = service.provider.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![AiMessage::system("be terse"), AiMessage::user("hello")]);
    }
}
