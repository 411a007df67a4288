// Serenity implementation of the chat transport port.
//
// Discord bans never expire on their own. A ban with `until` set is a
// regular ban, and `ModerationActions` lifts it again at `until`.

use crate::core::moderation::{
    ChatTransport, MessageRef, OutgoingMessage, RestrictPermissions, TransportError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

const SPAM_BAN_REASON: &str = "Gatekeeper: spam";

pub struct SerenityTransport {
    http: Arc<serenity::Http>,
}

impl SerenityTransport {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    /// The requested channel, or the guild's system channel.
    async fn target_channel(
        &self,
        guild_id: serenity::GuildId,
        channel_id: Option<u64>,
    ) -> Result<serenity::ChannelId, TransportError> {
        if let Some(id) = channel_id {
            return Ok(serenity::ChannelId::new(id));
        }

        let guild = guild_id
            .to_partial_guild(&self.http)
            .await
            .map_err(|e| transport_error(e, "view guild"))?;

        guild.system_channel_id.ok_or(TransportError::NoChannel)
    }
}

/// 403 means the bot lacks the capability, anything else is an API failure.
fn transport_error(err: serenity::Error, capability: &str) -> TransportError {
    if let serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) = &err {
        if response.status_code.as_u16() == 403 {
            return TransportError::MissingPermission(capability.to_string());
        }
    }
    TransportError::Api(err.to_string())
}

/// Custom emoji names that stand for a standard glyph, e.g. a guild's own `:poop:`.
const EMOJI_ALIASES: &[(&str, &str)] = &[
    ("poop", "💩"),
    ("hankey", "💩"),
    ("thumbsdown", "👎"),
    ("middlefinger", "🖕"),
    ("vomit", "🤮"),
    ("facevomiting", "🤮"),
    ("cursing", "🤬"),
    ("facewithsymbolsovermouth", "🤬"),
    ("rage", "😡"),
    ("pouting", "😡"),
    ("skull", "💀"),
    ("skullcrossbones", "☠️"),
    ("skullandcrossbones", "☠️"),
    ("nauseated", "🤢"),
    ("nauseatedface", "🤢"),
    ("imp", "👿"),
];

/// Map a custom emoji name to the glyph it imitates. Case, `_` and `-` are ignored.
pub fn glyph_for_emoji_name(name: &str) -> Option<&'static str> {
    let normalized: String = name
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    EMOJI_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, glyph)| *glyph)
}

fn timestamp(at: DateTime<Utc>) -> Result<serenity::Timestamp, TransportError> {
    serenity::Timestamp::from_unix_timestamp(at.timestamp())
        .map_err(|e| TransportError::Api(e.to_string()))
}

#[async_trait]
impl ChatTransport for SerenityTransport {
    async fn send_message(&self, message: OutgoingMessage) -> Result<MessageRef, TransportError> {
        let guild_id = serenity::GuildId::new(message.chat_id);
        let channel_id = self.target_channel(guild_id, message.channel_id).await?;

        let mut builder = serenity::CreateMessage::new().content(message.text);
        if !message.options.is_empty() {
            let buttons = message
                .options
                .into_iter()
                .map(|option| {
                    serenity::CreateButton::new(option.token)
                        .label(option.label)
                        .style(serenity::ButtonStyle::Secondary)
                })
                .collect();
            builder = builder.components(vec![serenity::CreateActionRow::Buttons(buttons)]);
        }

        let sent = channel_id
            .send_message(&self.http, builder)
            .await
            .map_err(|e| transport_error(e, "send messages"))?;

        Ok(MessageRef {
            channel_id: sent.channel_id.get(),
            message_id: sent.id.get(),
        })
    }

    async fn delete_message(
        &self,
        _chat_id: u64,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        serenity::ChannelId::new(message.channel_id)
            .delete_message(&self.http, serenity::MessageId::new(message.message_id))
            .await
            .map_err(|e| transport_error(e, "manage messages"))
    }

    async fn ban(
        &self,
        chat_id: u64,
        user_id: u64,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), TransportError> {
        let guild_id = serenity::GuildId::new(chat_id);
        let user = serenity::UserId::new(user_id);

        let reason = match until {
            Some(until) => format!("Gatekeeper: challenge failed, banned until {}", until),
            None => SPAM_BAN_REASON.to_string(),
        };

        guild_id
            .ban_with_reason(&self.http, user, 0, &reason)
            .await
            .map_err(|e| transport_error(e, "ban members"))
    }

    async fn unban(&self, chat_id: u64, user_id: u64) -> Result<(), TransportError> {
        serenity::GuildId::new(chat_id)
            .unban(&self.http, serenity::UserId::new(user_id))
            .await
            .map_err(|e| transport_error(e, "ban members"))
    }

    fn expires_bans(&self) -> bool {
        false
    }

    async fn restrict(
        &self,
        chat_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        permissions: RestrictPermissions,
    ) -> Result<(), TransportError> {
        // Discord timeouts are all-or-nothing; partial permissions still time the member out.
        tracing::debug!(chat_id, user_id, ?permissions, "Applying communication timeout");

        let builder =
            serenity::EditMember::new().disable_communication_until_datetime(timestamp(until)?);

        serenity::GuildId::new(chat_id)
            .edit_member(&self.http, serenity::UserId::new(user_id), builder)
            .await
            .map(|_| ())
            .map_err(|e| transport_error(e, "moderate members"))
    }

    async fn resolve_custom_emoji(
        &self,
        chat_id: u64,
        emoji_id: u64,
    ) -> Result<String, TransportError> {
        let emoji = serenity::GuildId::new(chat_id)
            .emoji(&self.http, serenity::EmojiId::new(emoji_id))
            .await
            .map_err(|e| transport_error(e, "view emojis"))?;

        Ok(glyph_for_emoji_name(&emoji.name)
            .map(str::to_string)
            .unwrap_or(emoji.name))
    }
}
