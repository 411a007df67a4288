// Reaction flood detector.
//
// Counts "negative" reactions per (chat, user) across events inside a rolling
// window and bans the user once the count reaches the threshold.

use super::moderation_actions::ModerationActions;
use super::moderation_models::{
    FlaggedReaction, MessageRef, ModerationAction, ModerationOutcome, ReactionKind, ReactionTally,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const FLAGGED_EMOJIS: &[&str] = &["💩", "👎", "🖕", "🤮", "🤬", "😡", "💀", "☠️", "🤢", "👿"];
pub const FLAG_THRESHOLD: usize = 5;
pub const TALLY_WINDOW_SECS: i64 = 60 * 60;
/// Every this many recorded reactions, tallies of all users are pruned.
const SWEEP_EVERY: usize = 128;

const VARIATION_SELECTOR: char = '\u{FE0F}';

/// Deny-list check, ignoring emoji variation selectors.
pub fn is_flagged(glyph: &str) -> bool {
    let normalized: String = glyph.chars().filter(|c| *c != VARIATION_SELECTOR).collect();
    FLAGGED_EMOJIS.iter().any(|flagged| {
        flagged
            .chars()
            .filter(|c| *c != VARIATION_SELECTOR)
            .eq(normalized.chars())
    })
}

pub struct ReactionFloodDetector {
    actions: ModerationActions,
    /// (chat_id, user_id) -> recent flagged reactions
    tallies: DashMap<(u64, u64), ReactionTally>,
    threshold: usize,
    window: ChronoDuration,
    recorded: AtomicUsize,
}

impl ReactionFloodDetector {
    pub fn new(actions: ModerationActions) -> Self {
        Self {
            actions,
            tallies: DashMap::new(),
            threshold: FLAG_THRESHOLD,
            window: ChronoDuration::seconds(TALLY_WINDOW_SECS),
            recorded: AtomicUsize::new(0),
        }
    }

    /// Returns the ban outcome if this event pushed the user over the threshold.
    pub async fn on_reaction(
        &self,
        chat_id: u64,
        user_id: u64,
        message: MessageRef,
        reactions: &[ReactionKind],
    ) -> Option<ModerationOutcome> {
        for reaction in reactions {
            let glyph = match reaction {
                ReactionKind::Emoji(glyph) => glyph.clone(),
                ReactionKind::Custom(emoji_id) => {
                    match self.actions.resolve_custom_emoji(chat_id, *emoji_id).await {
                        Ok(glyph) => glyph,
                        Err(e) => {
                            tracing::warn!(chat_id, user_id, emoji_id, error = %e, "Custom emoji lookup failed, skipping reaction");
                            continue;
                        }
                    }
                }
            };

            if !is_flagged(&glyph) {
                continue;
            }

            let count = self.record(chat_id, user_id, message, glyph);
            tracing::debug!(chat_id, user_id, count, "Flagged reaction recorded");

            if count >= self.threshold {
                tracing::warn!(chat_id, user_id, count, "User reached flagged reaction threshold, banning");
                self.tallies.remove(&(chat_id, user_id));
                let ban_ok = self.actions.ban(chat_id, user_id, None).await.is_ok();
                return Some(ModerationOutcome {
                    action: ModerationAction::Ban,
                    ban_ok: Some(ban_ok),
                    ..Default::default()
                });
            }
        }

        None
    }

    fn record(&self, chat_id: u64, user_id: u64, message: MessageRef, glyph: String) -> usize {
        let now = Utc::now();
        let cutoff = now - self.window;

        let count = {
            let mut tally = self.tallies.entry((chat_id, user_id)).or_default();
            tally.prune(cutoff);
            tally.occurrences.push(FlaggedReaction {
                message,
                glyph,
                at: now,
            });
            tally.count()
        };

        // The entry guard must be gone before touching the whole map.
        if self.recorded.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(cutoff);
        }
        count
    }

    /// Drop stale occurrences everywhere and forget users left with none.
    fn sweep(&self, cutoff: DateTime<Utc>) {
        let before = self.tallies.len();
        self.tallies.retain(|_, tally| {
            tally.prune(cutoff);
            tally.count() > 0
        });
        tracing::debug!(
            removed = before.saturating_sub(self.tallies.len()),
            "Swept stale reaction tallies"
        );
    }

    pub fn tally_count(&self, chat_id: u64, user_id: u64) -> usize {
        self.tallies
            .get(&(chat_id, user_id))
            .map(|t| t.count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_actions::test_support::{Call, RecordingTransport};
    use std::sync::Arc;

    const CHAT: u64 = 1;
    const USER: u64 = 2;

    fn message(id: u64) -> MessageRef {
        MessageRef {
            channel_id: 3,
            message_id: id,
        }
    }

    fn emoji(glyph: &str) -> ReactionKind {
        ReactionKind::Emoji(glyph.to_string())
    }

    #[test]
    fn test_flagged_matching_ignores_variation_selector() {
        assert!(is_flagged("👎"));
        assert!(is_flagged("☠️"));
        assert!(is_flagged("☠"));
        assert!(!is_flagged("👍"));
        assert!(!is_flagged("👎👎"));
    }

    #[tokio::test]
    async fn test_threshold_reached_across_events() {
        let transport = Arc::new(RecordingTransport::default());
        let detector = ReactionFloodDetector::new(ModerationActions::new(transport.clone()));

        for id in 0..4 {
            let outcome = detector
                .on_reaction(CHAT, USER, message(id), &[emoji("💩")])
                .await;
            assert!(outcome.is_none());
        }
        assert_eq!(detector.tally_count(CHAT, USER), 4);

        let outcome = detector
            .on_reaction(CHAT, USER, message(5), &[emoji("🤮")])
            .await
            .expect("fifth flagged reaction bans");

        assert_eq!(outcome.action, ModerationAction::Ban);
        assert_eq!(outcome.ban_ok, Some(true));
        assert_eq!(transport.bans(), vec![(CHAT, USER, None)]);
        assert!(transport.deletes().is_empty(), "flood path never deletes");
        assert_eq!(detector.tally_count(CHAT, USER), 0);
    }

    #[tokio::test]
    async fn test_harmless_reactions_are_not_counted() {
        let transport = Arc::new(RecordingTransport::default());
        let detector = ReactionFloodDetector::new(ModerationActions::new(transport.clone()));

        for id in 0..10 {
            detector
                .on_reaction(CHAT, USER, message(id), &[emoji("👍"), emoji("🔥")])
                .await;
        }

        assert_eq!(detector.tally_count(CHAT, USER), 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tallies_are_per_user() {
        let transport = Arc::new(RecordingTransport::default());
        let detector = ReactionFloodDetector::new(ModerationActions::new(transport.clone()));

        for id in 0..4 {
            detector.on_reaction(CHAT, USER, message(id), &[emoji("👎")]).await;
            detector.on_reaction(CHAT, USER + 1, message(id), &[emoji("👎")]).await;
        }

        assert!(transport.bans().is_empty());
        assert_eq!(detector.tally_count(CHAT, USER + 1), 4);
    }

    #[tokio::test]
    async fn test_custom_emoji_resolved_and_failures_skipped() {
        let transport = Arc::new(RecordingTransport {
            custom_emoji: vec![(77, "🖕".to_string())],
            ..Default::default()
        });
        let detector = ReactionFloodDetector::new(ModerationActions::new(transport.clone()));

        detector
            .on_reaction(
                CHAT,
                USER,
                message(1),
                &[ReactionKind::Custom(99), ReactionKind::Custom(77), emoji("💀")],
            )
            .await;

        assert_eq!(detector.tally_count(CHAT, USER), 2);
        assert!(transport.calls().contains(&Call::Resolve(CHAT, 99)));
    }

    #[tokio::test]
    async fn test_stale_tallies_are_forgotten() {
        let transport = Arc::new(RecordingTransport::default());
        let detector = ReactionFloodDetector::new(ModerationActions::new(transport.clone()));

        let stale = Utc::now() - ChronoDuration::hours(5);
        for user in 10_000..20_000 {
            detector.tallies.insert(
                (CHAT, user),
                ReactionTally {
                    occurrences: vec![FlaggedReaction {
                        message: message(1),
                        glyph: "💩".to_string(),
                        at: stale,
                    }],
                },
            );
        }

        for user in 0..SWEEP_EVERY as u64 {
            detector
                .on_reaction(CHAT, user, message(2), &[emoji("💩")])
                .await;
        }

        assert_eq!(detector.tallies.len(), SWEEP_EVERY);
        assert_eq!(detector.tally_count(CHAT, 0), 1);
        assert_eq!(detector.tally_count(CHAT, 10_000), 0);
    }

    #[tokio::test]
    async fn test_old_occurrences_fall_out_of_window() {
        let transport = Arc::new(RecordingTransport::default());
        let detector = ReactionFloodDetector::new(ModerationActions::new(transport.clone()));

        let stale = Utc::now() - ChronoDuration::seconds(TALLY_WINDOW_SECS + 60);
        detector.tallies.insert(
            (CHAT, USER),
            ReactionTally {
                occurrences: (0..4)
                    .map(|id| FlaggedReaction {
                        message: message(id),
                        glyph: "💩".to_string(),
                        at: stale,
                    })
                    .collect(),
            },
        );

        let outcome = detector
            .on_reaction(CHAT, USER, message(9), &[emoji("💩")])
            .await;

        assert!(outcome.is_none());
        assert_eq!(detector.tally_count(CHAT, USER), 1);
    }
}
