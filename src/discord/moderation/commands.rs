// Gatekeeper slash commands for per-guild configuration.

use crate::core::i18n::Language;
use crate::core::moderation::ChatSettings;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Longest challenge or ban timeout an admin may configure.
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Gatekeeper configuration commands.
///
/// Manage new-member challenges and first-message spam checks for this server.
#[poise::command(
    slash_command,
    subcommands("status", "enable", "disable", "timeouts", "language"),
    required_permissions = "BAN_MEMBERS",
    guild_only
)]
pub async fn gatekeeper(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn status_embed(settings: &ChatSettings) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("🛡️ Gatekeeper Status")
        .color(if settings.enabled { 0x00FF00 } else { 0xFF0000 })
        .field(
            "Status",
            if settings.enabled {
                "✅ Enabled"
            } else {
                "❌ Disabled"
            },
            false,
        )
        .field(
            "Challenge timeout",
            format!("{} seconds", settings.challenge_timeout().as_secs()),
            true,
        )
        .field(
            "Ban timeout",
            format!("{} seconds", settings.ban_timeout().as_secs()),
            true,
        )
        .field(
            "Language",
            Language::from_tag(&settings.language).tag(),
            true,
        )
}

/// Show the gatekeeper settings for this server.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    let settings = ctx.data().pipeline.settings().settings_for(guild_id.get()).await;

    ctx.send(poise::CreateReply::default().embed(status_embed(&settings)))
        .await?;
    Ok(())
}

/// Enable challenges and spam checks.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    ctx.data()
        .pipeline
        .settings()
        .set_enabled(guild_id.get(), true)
        .await?;

    ctx.say("✅ Gatekeeper has been **enabled**.").await?;
    Ok(())
}

/// Disable challenges and spam checks.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    ctx.data()
        .pipeline
        .settings()
        .set_enabled(guild_id.get(), false)
        .await?;

    ctx.say("❌ Gatekeeper has been **disabled**.").await?;
    Ok(())
}

/// Change how long newcomers get to answer and how long failed ones stay out.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn timeouts(
    ctx: Context<'_>,
    #[description = "Seconds to answer the challenge (default: 60)"] challenge_secs: Option<u64>,
    #[description = "Seconds a failed newcomer stays out (default: 600)"] ban_secs: Option<u64>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    if [challenge_secs, ban_secs]
        .iter()
        .flatten()
        .any(|&secs| secs > MAX_TIMEOUT_SECS)
    {
        ctx.say(format!(
            "⚠️ Timeouts can be at most {} seconds.",
            MAX_TIMEOUT_SECS
        ))
        .await?;
        return Ok(());
    }

    let settings = ctx
        .data()
        .pipeline
        .settings()
        .update(guild_id.get(), |s| {
            if let Some(v) = challenge_secs {
                s.challenge_timeout_secs = v;
            }
            if let Some(v) = ban_secs {
                s.ban_timeout_secs = v;
            }
        })
        .await?;

    ctx.say(format!(
        "✅ Gatekeeper timeouts updated!\n\
         • Challenge: {} sec\n\
         • Ban: {} sec",
        settings.challenge_timeout().as_secs(),
        settings.ban_timeout().as_secs()
    ))
    .await?;
    Ok(())
}

/// Set the language of challenge prompts and notices.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn language(
    ctx: Context<'_>,
    #[description = "Language tag: en or ru"] tag: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    if !Language::is_supported(&tag) {
        ctx.say(format!("⚠️ Unsupported language `{}`. Use `en` or `ru`.", tag))
            .await?;
        return Ok(());
    }

    let language = Language::from_tag(&tag);
    ctx.data()
        .pipeline
        .settings()
        .update(guild_id.get(), |s| s.language = language.tag().to_string())
        .await?;

    ctx.say(format!("✅ Gatekeeper language set to `{}`.", language.tag()))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_registered_under_gatekeeper() {
        let command = gatekeeper();
        let names: Vec<_> = command
            .subcommands
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["status", "enable", "disable", "timeouts", "language"]
        );
        assert!(command.guild_only);
        assert!(command
            .required_permissions
            .contains(serenity::Permissions::BAN_MEMBERS));
    }
}
