// Join-time captcha gate.
//
// One join event becomes one batch: a single prompt naming every human joiner,
// one waiter task per joiner, and a barrier that deletes the prompt once every
// waiter has finished. Batches in the same chat run one after another.

use super::captcha::{answer_token, draw_captcha, parse_answer_token, random_id, CaptchaDraw};
use super::chat_settings::ChatSettingsService;
use super::moderation_actions::ModerationActions;
use super::moderation_models::{
    AnswerOutcome, BatchReport, ChallengeStatus, JoiningUser, OutgoingMessage, PromptOption,
    TransportError,
};
use crate::core::i18n::{render, Language, Phrase};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ChallengeError {
    /// The prompt never reached the chat, so the batch was abandoned.
    #[error("Failed to send challenge prompt: {0}")]
    PromptFailed(#[from] TransportError),

    #[error("Challenge batch cancelled")]
    Cancelled,
}

// ============================================================================
// SESSIONS
// ============================================================================

/// One joiner's challenge. Its status moves away from `Pending` at most once.
#[derive(Debug)]
pub struct ChallengeSession {
    pub chat_id: u64,
    pub user_id: u64,
    pub display_name: String,
    pub deadline: Instant,
    status: Mutex<ChallengeStatus>,
}

impl ChallengeSession {
    fn new(chat_id: u64, joiner: &JoiningUser, timeout: Duration) -> Self {
        Self {
            chat_id,
            user_id: joiner.user_id,
            display_name: joiner.display_name.clone(),
            deadline: Instant::now() + timeout,
            status: Mutex::new(ChallengeStatus::Pending),
        }
    }

    pub fn status(&self) -> ChallengeStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to a terminal status. Returns `false` if already terminal.
    fn resolve(&self, to: ChallengeStatus) -> bool {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if status.is_terminal() {
            return false;
        }
        *status = to;
        true
    }
}

/// Server-side half of an answer token.
struct PendingAnswer {
    batch_id: String,
    correct_nonce: String,
    success: Option<oneshot::Sender<()>>,
}

// ============================================================================
// COORDINATOR
// ============================================================================

pub struct ChallengeCoordinator {
    actions: ModerationActions,
    settings: Arc<ChatSettingsService>,
    /// Held for the whole life of a batch, so one chat tracks one batch at a time.
    chat_locks: DashMap<u64, Arc<tokio::sync::Mutex<()>>>,
    /// (chat_id, user_id) -> pending answer of the current batch
    pending: DashMap<(u64, u64), PendingAnswer>,
}

impl ChallengeCoordinator {
    pub fn new(actions: ModerationActions, settings: Arc<ChatSettingsService>) -> Self {
        Self {
            actions,
            settings,
            chat_locks: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Challenge every human in `joiners` and return once the whole batch is resolved.
    pub async fn on_members_joined(
        &self,
        chat_id: u64,
        joiners: Vec<JoiningUser>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, ChallengeError> {
        let lock = self.chat_locks.entry(chat_id).or_default().clone();
        let _guard = tokio::select! {
            guard = lock.lock() => guard,
            _ = cancel.cancelled() => return Err(ChallengeError::Cancelled),
        };

        let mut report = BatchReport {
            chat_id,
            succeeded: Vec::new(),
            timed_out: Vec::new(),
            prompt_deleted: false,
        };

        let humans: Vec<JoiningUser> = joiners.into_iter().filter(|j| !j.is_bot).collect();
        if humans.is_empty() {
            tracing::debug!(chat_id, "Only automated accounts joined, nothing to challenge");
            self.clear_chat(chat_id);
            return Ok(report);
        }

        let settings = self.settings.settings_for(chat_id).await;
        let lang = Language::from_tag(&settings.language);
        let timeout = settings.challenge_timeout();

        let (draw, batch_id, nonces) = {
            let mut rng = rand::thread_rng();
            let draw = draw_captcha(&mut rng, lang);
            let batch_id = random_id(&mut rng);
            let mut nonces: Vec<String> = Vec::with_capacity(draw.options.len());
            while nonces.len() < draw.options.len() {
                let nonce = random_id(&mut rng);
                if !nonces.contains(&nonce) {
                    nonces.push(nonce);
                }
            }
            (draw, batch_id, nonces)
        };

        let sessions: Vec<Arc<ChallengeSession>> = humans
            .iter()
            .map(|joiner| Arc::new(ChallengeSession::new(chat_id, joiner, timeout)))
            .collect();

        let prompt = self
            .actions
            .send(build_prompt(chat_id, &sessions, &draw, &batch_id, &nonces, lang))
            .await?;

        tracing::info!(
            chat_id,
            batch_id = %batch_id,
            joiners = sessions.len(),
            timeout_secs = timeout.as_secs(),
            "Challenge prompt sent"
        );

        let correct_nonce = nonces[draw.correct].clone();
        let mut waiters = JoinSet::new();
        for session in &sessions {
            let (tx, rx) = oneshot::channel();
            self.pending.insert(
                (chat_id, session.user_id),
                PendingAnswer {
                    batch_id: batch_id.clone(),
                    correct_nonce: correct_nonce.clone(),
                    success: Some(tx),
                },
            );

            waiters.spawn(wait_for_answer(
                Arc::clone(session),
                rx,
                cancel.child_token(),
                self.actions.clone(),
                settings.ban_timeout(),
            ));
        }

        while let Some(joined) = waiters.join_next().await {
            if let Err(e) = joined {
                tracing::error!(chat_id, error = %e, "Challenge waiter panicked");
            }
        }

        self.pending
            .retain(|(chat, _), pending| *chat != chat_id || pending.batch_id != batch_id);

        for session in &sessions {
            match session.status() {
                ChallengeStatus::Succeeded => report.succeeded.push(session.user_id),
                ChallengeStatus::TimedOut => report.timed_out.push(session.user_id),
                ChallengeStatus::Pending => {}
            }
        }

        if !sessions.iter().all(|s| s.status().is_terminal()) {
            tracing::warn!(chat_id, batch_id = %batch_id, "Challenge batch cancelled before completion");
            return Err(ChallengeError::Cancelled);
        }

        match self.actions.delete_message(chat_id, prompt).await {
            Ok(()) => report.prompt_deleted = true,
            Err(_) => tracing::warn!(chat_id, batch_id = %batch_id, "Challenge prompt left in chat"),
        }

        tracing::info!(
            chat_id,
            batch_id = %batch_id,
            succeeded = report.succeeded.len(),
            timed_out = report.timed_out.len(),
            "Challenge batch finished"
        );

        Ok(report)
    }

    /// Resolve a button press. Only correctness is derived from the token.
    pub fn on_challenge_answer(&self, chat_id: u64, user_id: u64, token: &str) -> AnswerOutcome {
        let Some((batch_id, nonce)) = parse_answer_token(token) else {
            tracing::debug!(chat_id, user_id, "Ignoring unrecognized answer token");
            return AnswerOutcome::NotChallenged;
        };

        let Some(mut pending) = self.pending.get_mut(&(chat_id, user_id)) else {
            return AnswerOutcome::NotChallenged;
        };

        if pending.batch_id != batch_id {
            return AnswerOutcome::NotChallenged;
        }

        if pending.correct_nonce != nonce {
            tracing::info!(chat_id, user_id, "Incorrect challenge answer");
            return AnswerOutcome::Incorrect;
        }

        match pending.success.take() {
            // Already answered correctly
            None => AnswerOutcome::Accepted,
            Some(tx) => match tx.send(()) {
                Ok(()) => AnswerOutcome::Accepted,
                Err(()) => AnswerOutcome::Expired,
            },
        }
    }

    /// Forget any stale pending answers for a chat.
    pub fn clear_chat(&self, chat_id: u64) {
        self.pending.retain(|(chat, _), _| *chat != chat_id);
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn build_prompt(
    chat_id: u64,
    sessions: &[Arc<ChallengeSession>],
    draw: &CaptchaDraw,
    batch_id: &str,
    nonces: &[String],
    lang: Language,
) -> OutgoingMessage {
    let names = sessions
        .iter()
        .map(|s| s.display_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let text = render(
        Phrase::ChallengeGreeting,
        lang,
        &[("names", &names), ("label", &draw.correct_option().label)],
    );

    let options = draw
        .options
        .iter()
        .zip(nonces)
        .map(|(option, nonce)| PromptOption {
            label: option.glyph.clone(),
            token: answer_token(batch_id, nonce),
        })
        .collect();

    OutgoingMessage {
        chat_id,
        channel_id: None,
        text,
        options,
    }
}

/// Wait for whichever comes first: a correct answer, the deadline, or cancellation.
async fn wait_for_answer(
    session: Arc<ChallengeSession>,
    answered: oneshot::Receiver<()>,
    cancel: CancellationToken,
    actions: ModerationActions,
    ban_timeout: Duration,
) {
    let chat_id = session.chat_id;
    let user_id = session.user_id;

    // A dropped sender means no answer will ever arrive.
    let answered = async {
        if answered.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        biased;
        _ = answered => {
            if session.resolve(ChallengeStatus::Succeeded) {
                tracing::info!(chat_id, user_id, "User passed challenge, timer stopped");
            }
        }
        _ = tokio::time::sleep_until(session.deadline) => {
            if session.resolve(ChallengeStatus::TimedOut) {
                tracing::info!(chat_id, user_id, "User challenge timed out, banning until timeout");
                let until = Utc::now()
                    + chrono::Duration::seconds(ban_timeout.as_secs() as i64);
                if actions.ban(chat_id, user_id, Some(until)).await.is_err() {
                    tracing::warn!(chat_id, user_id, "Could not ban user, leaving them in place");
                }
            }
        }
        _ = cancel.cancelled() => {
            tracing::debug!(chat_id, user_id, "Challenge waiter cancelled");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
