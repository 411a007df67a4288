// Gateway event boundary.
//
// Each serenity event is converted once into a `ChatEvent`; everything past
// this point is platform-agnostic. Non-guild events and the bot's own
// activity never reach the pipeline.

use crate::core::i18n::{translate, Phrase};
use crate::core::moderation::{
    AnswerOutcome, ChallengeError, ChatEvent, IncomingMessage, JoiningUser, MessageRef,
    PipelineOutcome, ReactionKind,
};
use crate::discord::moderation::transport::glyph_for_emoji_name;
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub fn to_chat_event(event: &serenity::FullEvent, bot_id: serenity::UserId) -> Option<ChatEvent> {
    match event {
        serenity::FullEvent::GuildMemberAddition { new_member } => Some(ChatEvent::Join {
            chat_id: new_member.guild_id.get(),
            joiners: vec![JoiningUser {
                user_id: new_member.user.id.get(),
                display_name: new_member.display_name().to_string(),
                is_bot: new_member.user.bot,
            }],
        }),
        serenity::FullEvent::Message { new_message } => {
            let guild_id = new_message.guild_id?;
            if new_message.author.bot || new_message.author.id == bot_id {
                return None;
            }

            Some(ChatEvent::Message {
                chat_id: guild_id.get(),
                user_id: new_message.author.id.get(),
                message: IncomingMessage {
                    message: MessageRef {
                        channel_id: new_message.channel_id.get(),
                        message_id: new_message.id.get(),
                    },
                    author_name: new_message.author.name.clone(),
                    text: Some(new_message.content.clone()).filter(|t| !t.is_empty()),
                    caption: new_message
                        .attachments
                        .first()
                        .and_then(|a| a.description.clone()),
                },
            })
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            let guild_id = add_reaction.guild_id?;
            let user_id = add_reaction.user_id?;
            if user_id == bot_id {
                return None;
            }
            let kind = reaction_kind(&add_reaction.emoji)?;

            Some(ChatEvent::Reaction {
                chat_id: guild_id.get(),
                user_id: user_id.get(),
                message: MessageRef {
                    channel_id: add_reaction.channel_id.get(),
                    message_id: add_reaction.message_id.get(),
                },
                reactions: vec![kind],
            })
        }
        serenity::FullEvent::InteractionCreate { interaction } => {
            let component = interaction.as_message_component()?;
            Some(ChatEvent::ChallengeAnswer {
                chat_id: component.guild_id?.get(),
                user_id: component.user.id.get(),
                token: component.data.custom_id.clone(),
            })
        }
        _ => None,
    }
}

fn reaction_kind(emoji: &serenity::ReactionType) -> Option<ReactionKind> {
    match emoji {
        serenity::ReactionType::Unicode(glyph) => Some(ReactionKind::Emoji(glyph.clone())),
        // The gateway usually sends the name, so only nameless emoji cost a lookup.
        serenity::ReactionType::Custom { id, name, .. } => match name.as_deref() {
            Some(name) => glyph_for_emoji_name(name).map(|g| ReactionKind::Emoji(g.to_string())),
            None => Some(ReactionKind::Custom(id.get())),
        },
        _ => None,
    }
}

fn answer_phrase(outcome: AnswerOutcome) -> Phrase {
    match outcome {
        AnswerOutcome::Accepted => Phrase::AnswerAccepted,
        AnswerOutcome::Incorrect => Phrase::AnswerIncorrect,
        AnswerOutcome::NotChallenged => Phrase::AnswerNotChallenged,
        AnswerOutcome::Expired => Phrase::AnswerExpired,
    }
}

fn log_outcome(outcome: &Result<PipelineOutcome, ChallengeError>) {
    match outcome {
        Ok(PipelineOutcome::Ignored | PipelineOutcome::Disabled) => {}
        Ok(outcome) => tracing::debug!(?outcome, "Event handled"),
        Err(ChallengeError::Cancelled) => tracing::info!("Challenge batch cancelled"),
        Err(e) => tracing::error!(error = %e, "Challenge batch failed"),
    }
}

/// Feed one gateway event through the moderation pipeline.
pub async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    bot_id: serenity::UserId,
    data: &Data,
) -> Result<(), Error> {
    let Some(chat_event) = to_chat_event(event, bot_id) else {
        return Ok(());
    };

    match chat_event {
        ChatEvent::Join { .. } => {
            // A batch holds until every session resolves, so it gets its own task.
            let pipeline = Arc::clone(&data.pipeline);
            let cancel = data.shutdown.child_token();
            tokio::spawn(async move {
                let outcome = pipeline.dispatch(chat_event, &cancel).await;
                log_outcome(&outcome);
            });
        }
        ChatEvent::ChallengeAnswer { chat_id, .. } => {
            let outcome = data
                .pipeline
                .dispatch(chat_event, &data.shutdown.child_token())
                .await;
            log_outcome(&outcome);

            let Ok(PipelineOutcome::Answer(answer)) = outcome else {
                return Ok(());
            };
            let component = match event {
                serenity::FullEvent::InteractionCreate { interaction } => {
                    interaction.as_message_component()
                }
                _ => None,
            };
            let Some(component) = component else {
                return Ok(());
            };

            let language = data.pipeline.language_for(chat_id).await;
            let reply = serenity::CreateInteractionResponseMessage::new()
                .content(translate(answer_phrase(answer), language))
                .ephemeral(true);
            component
                .create_response(&ctx.http, serenity::CreateInteractionResponse::Message(reply))
                .await?;
        }
        other => {
            let outcome = data
                .pipeline
                .dispatch(other, &data.shutdown.child_token())
                .await;
            log_outcome(&outcome);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaction_kinds() {
        assert_eq!(
            reaction_kind(&serenity::ReactionType::Unicode("💩".to_string())),
            Some(ReactionKind::Emoji("💩".to_string()))
        );
        let custom = |name: Option<&str>| serenity::ReactionType::Custom {
            animated: false,
            id: serenity::EmojiId::new(77),
            name: name.map(str::to_string),
        };
        assert_eq!(
            reaction_kind(&custom(Some("thumbs_down"))),
            Some(ReactionKind::Emoji("👎".to_string()))
        );
        assert_eq!(reaction_kind(&custom(Some("pepe_angry"))), None);
        assert_eq!(reaction_kind(&custom(None)), Some(ReactionKind::Custom(77)));
    }

    #[test]
    fn test_every_answer_has_a_phrase() {
        use crate::core::i18n::Language;

        for outcome in [
            AnswerOutcome::Accepted,
            AnswerOutcome::Incorrect,
            AnswerOutcome::NotChallenged,
            AnswerOutcome::Expired,
        ] {
            assert!(!translate(answer_phrase(outcome), Language::En).is_empty());
            assert!(!translate(answer_phrase(outcome), Language::Ru).is_empty());
        }
    }
}
