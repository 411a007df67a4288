// Moderation actions - the primitive operations every handler ends in.
//
// Stateless: each call goes straight to the chat transport and reports
// success or failure on its own. Callers never assume two calls succeed together.

use super::moderation_models::{
    MessageRef, ModerationAction, ModerationOutcome, OutgoingMessage, RestrictPermissions,
    TransportError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// TRANSPORT TRAIT (PORT)
// ============================================================================

/// Everything the pipeline needs from the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a message, optionally with inline options. Returns where it landed.
    async fn send_message(&self, message: OutgoingMessage) -> Result<MessageRef, TransportError>;

    async fn delete_message(&self, chat_id: u64, message: MessageRef)
        -> Result<(), TransportError>;

    /// Remove a user. `until = None` is permanent, otherwise the user may rejoin after `until`.
    async fn ban(
        &self,
        chat_id: u64,
        user_id: u64,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), TransportError>;

    async fn restrict(
        &self,
        chat_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        permissions: RestrictPermissions,
    ) -> Result<(), TransportError>;

    /// Lift a ban placed earlier.
    async fn unban(&self, chat_id: u64, user_id: u64) -> Result<(), TransportError>;

    /// Resolve a custom emoji id to the glyph it stands for.
    async fn resolve_custom_emoji(&self, chat_id: u64, emoji_id: u64)
        -> Result<String, TransportError>;

    /// `false` when the platform keeps every ban until it is lifted explicitly.
    /// Time-boxed bans are then lifted by `ModerationActions` at `until`.
    fn expires_bans(&self) -> bool {
        true
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

#[derive(Clone)]
pub struct ModerationActions {
    transport: Arc<dyn ChatTransport>,
    /// Cancelling lifts pending time-boxed bans immediately.
    shutdown: CancellationToken,
}

impl ModerationActions {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Ban a user. An `until` that is not in the future means indefinite.
    pub async fn ban(
        &self,
        chat_id: u64,
        user_id: u64,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), TransportError> {
        let until = until.filter(|t| *t > Utc::now());
        match self.transport.ban(chat_id, user_id, until).await {
            Ok(()) => {
                tracing::info!(chat_id, user_id, until = ?until, "User banned");
                if let Some(until) = until {
                    if !self.transport.expires_bans() {
                        self.schedule_unban(chat_id, user_id, until);
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(chat_id, user_id, until = ?until, error = %e, "Failed to ban user");
                Err(e)
            }
        }
    }

    /// Lift the ban at `until`, or right away on shutdown since nothing
    /// would remember it after a restart.
    fn schedule_unban(&self, chat_id: u64, user_id: u64, until: DateTime<Utc>) {
        let transport = Arc::clone(&self.transport);
        let shutdown = self.shutdown.clone();
        let wait = (until - Utc::now()).to_std().unwrap_or_default();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!(chat_id, user_id, "Shutting down, lifting time-boxed ban early");
                }
            }
            match transport.unban(chat_id, user_id).await {
                Ok(()) => tracing::info!(chat_id, user_id, "Time-boxed ban lifted"),
                Err(e) => {
                    tracing::error!(chat_id, user_id, error = %e, "Failed to lift time-boxed ban")
                }
            }
        });
    }

    pub async fn delete_message(
        &self,
        chat_id: u64,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        self.transport
            .delete_message(chat_id, message)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    chat_id,
                    channel_id = message.channel_id,
                    message_id = message.message_id,
                    error = %e,
                    "Failed to delete message"
                );
            })
    }

    /// Temporary media lock-down.
    pub async fn restrict(
        &self,
        chat_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        permissions: RestrictPermissions,
    ) -> ModerationOutcome {
        let result = self
            .transport
            .restrict(chat_id, user_id, until, permissions)
            .await;
        if let Err(e) = &result {
            tracing::error!(chat_id, user_id, error = %e, "Failed to restrict user");
        }

        ModerationOutcome {
            action: ModerationAction::Restrict,
            restrict_ok: Some(result.is_ok()),
            ..Default::default()
        }
    }

    /// Delete the offending message, then ban its author indefinitely.
    /// Both are attempted even if the first fails.
    pub async fn ban_and_delete(
        &self,
        chat_id: u64,
        user_id: u64,
        message: MessageRef,
    ) -> ModerationOutcome {
        let delete_ok = self.delete_message(chat_id, message).await.is_ok();
        let ban_ok = self.ban(chat_id, user_id, None).await.is_ok();

        ModerationOutcome {
            action: ModerationAction::BanAndDelete,
            ban_ok: Some(ban_ok),
            delete_ok: Some(delete_ok),
            ..Default::default()
        }
    }

    pub async fn send(&self, message: OutgoingMessage) -> Result<MessageRef, TransportError> {
        let chat_id = message.chat_id;
        self.transport
            .send_message(message)
            .await
            .inspect_err(|e| tracing::error!(chat_id, error = %e, "Failed to send message"))
    }

    pub async fn resolve_custom_emoji(
        &self,
        chat_id: u64,
        emoji_id: u64,
    ) -> Result<String, TransportError> {
        self.transport.resolve_custom_emoji(chat_id, emoji_id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    //! Recording transport shared by the moderation tests.

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Send(OutgoingMessage),
        Delete(u64, MessageRef),
        Ban(u64, u64, Option<DateTime<Utc>>),
        Unban(u64, u64),
        Restrict(u64, u64),
        Resolve(u64, u64),
    }

    #[derive(Default)]
    pub struct RecordingTransport {
        pub calls: Mutex<Vec<Call>>,
        pub fail_send: bool,
        pub fail_delete: bool,
        pub fail_ban: bool,
        pub fail_restrict: bool,
        pub fail_resolve: bool,
        /// custom emoji id -> glyph
        pub custom_emoji: Vec<(u64, String)>,
        /// Behave like a platform whose bans never expire on their own.
        pub permanent_bans_only: bool,
        /// Simulated latency of a ban call.
        pub ban_delay: Option<std::time::Duration>,
    }

    impl RecordingTransport {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn bans(&self) -> Vec<(u64, u64, Option<DateTime<Utc>>)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Ban(chat, user, until) => Some((chat, user, until)),
                    _ => None,
                })
                .collect()
        }

        pub fn sent(&self) -> Vec<OutgoingMessage> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Send(m) => Some(m),
                    _ => None,
                })
                .collect()
        }

        pub fn deletes(&self) -> Vec<MessageRef> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Delete(_, m) => Some(m),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn outcome(fail: bool, what: &str) -> Result<(), TransportError> {
            if fail {
                Err(TransportError::MissingPermission(what.to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_message(
            &self,
            message: OutgoingMessage,
        ) -> Result<MessageRef, TransportError> {
            self.record(Call::Send(message));
            Self::outcome(self.fail_send, "send messages")?;
            Ok(MessageRef {
                channel_id: 10,
                message_id: 900 + self.sent().len() as u64,
            })
        }

        async fn delete_message(
            &self,
            chat_id: u64,
            message: MessageRef,
        ) -> Result<(), TransportError> {
            self.record(Call::Delete(chat_id, message));
            Self::outcome(self.fail_delete, "manage messages")
        }

        async fn ban(
            &self,
            chat_id: u64,
            user_id: u64,
            until: Option<DateTime<Utc>>,
        ) -> Result<(), TransportError> {
            self.record(Call::Ban(chat_id, user_id, until));
            if let Some(delay) = self.ban_delay {
                tokio::time::sleep(delay).await;
            }
            Self::outcome(self.fail_ban, "ban members")
        }

        async fn unban(&self, chat_id: u64, user_id: u64) -> Result<(), TransportError> {
            self.record(Call::Unban(chat_id, user_id));
            Ok(())
        }

        fn expires_bans(&self) -> bool {
            !self.permanent_bans_only
        }

        async fn restrict(
            &self,
            chat_id: u64,
            user_id: u64,
            _until: DateTime<Utc>,
            _permissions: RestrictPermissions,
        ) -> Result<(), TransportError> {
            self.record(Call::Restrict(chat_id, user_id));
            Self::outcome(self.fail_restrict, "moderate members")
        }

        async fn resolve_custom_emoji(
            &self,
            chat_id: u64,
            emoji_id: u64,
        ) -> Result<String, TransportError> {
            self.record(Call::Resolve(chat_id, emoji_id));
            if self.fail_resolve {
                return Err(TransportError::Api("unknown emoji".to_string()));
            }
            self.custom_emoji
                .iter()
                .find(|(id, _)| *id == emoji_id)
                .map(|(_, glyph)| glyph.clone())
                .ok_or_else(|| TransportError::Api("unknown emoji".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::Duration as ChronoDuration;

    const MESSAGE: MessageRef = MessageRef {
        channel_id: 5,
        message_id: 6,
    };

    #[tokio::test]
    async fn test_ban_and_delete_reports_each_step() {
        let transport = Arc::new(RecordingTransport {
            fail_delete: true,
            ..Default::default()
        });
        let actions = ModerationActions::new(transport.clone());

        let outcome = actions.ban_and_delete(1, 2, MESSAGE).await;

        assert_eq!(outcome.action, ModerationAction::BanAndDelete);
        assert_eq!(outcome.delete_ok, Some(false));
        assert_eq!(outcome.ban_ok, Some(true));
        assert_eq!(
            transport.calls(),
            vec![Call::Delete(1, MESSAGE), Call::Ban(1, 2, None)]
        );
    }

    #[tokio::test]
    async fn test_past_until_means_indefinite() {
        let transport = Arc::new(RecordingTransport::default());
        let actions = ModerationActions::new(transport.clone());

        let past = Utc::now() - ChronoDuration::minutes(1);
        actions.ban(1, 2, Some(past)).await.unwrap();

        let future = Utc::now() + ChronoDuration::minutes(10);
        actions.ban(1, 3, Some(future)).await.unwrap();

        let bans = transport.bans();
        assert_eq!(bans[0], (1, 2, None));
        assert_eq!(bans[1], (1, 3, Some(future)));
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_boxed_ban_lifted_at_until_when_platform_cannot_expire() {
        let transport = Arc::new(RecordingTransport {
            permanent_bans_only: true,
            ..Default::default()
        });
        let actions = ModerationActions::new(transport.clone());

        actions
            .ban(1, 2, Some(Utc::now() + ChronoDuration::minutes(10)))
            .await
            .unwrap();
        // Indefinite bans are never lifted.
        actions.ban(1, 3, None).await.unwrap();

        tokio::time::advance(std::time::Duration::from_secs(9 * 60)).await;
        settle().await;
        assert!(!transport.calls().contains(&Call::Unban(1, 2)));

        tokio::time::advance(std::time::Duration::from_secs(2 * 60)).await;
        settle().await;
        let unbans: Vec<_> = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Unban(..)))
            .collect();
        assert_eq!(unbans, vec![Call::Unban(1, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lifts_time_boxed_ban_early() {
        let transport = Arc::new(RecordingTransport {
            permanent_bans_only: true,
            ..Default::default()
        });
        let shutdown = CancellationToken::new();
        let actions = ModerationActions::new(transport.clone()).with_shutdown(shutdown.clone());

        actions
            .ban(1, 2, Some(Utc::now() + ChronoDuration::minutes(10)))
            .await
            .unwrap();
        settle().await;
        assert!(!transport.calls().contains(&Call::Unban(1, 2)));

        shutdown.cancel();
        settle().await;
        assert!(transport.calls().contains(&Call::Unban(1, 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiring_platform_needs_no_unban() {
        let transport = Arc::new(RecordingTransport::default());
        let actions = ModerationActions::new(transport.clone());

        actions
            .ban(1, 2, Some(Utc::now() + ChronoDuration::minutes(10)))
            .await
            .unwrap();
        tokio::time::advance(std::time::Duration::from_secs(3600)).await;
        settle().await;

        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_restrict_failure_is_reported() {
        let transport = Arc::new(RecordingTransport {
            fail_restrict: true,
            ..Default::default()
        });
        let actions = ModerationActions::new(transport.clone());

        let outcome = actions
            .restrict(1, 2, Utc::now(), RestrictPermissions::media_lockdown())
            .await;

        assert_eq!(outcome.action, ModerationAction::Restrict);
        assert_eq!(outcome.restrict_ok, Some(false));
        assert!(!outcome.fully_applied());
    }
}
