// Bot presence. Kept tiny: one status line so admins can see the gate is up.

use poise::serenity_prelude as serenity;

/// Called once the bot is ready.
pub fn on_ready(ctx: &serenity::Context) {
    let activity = serenity::ActivityData::watching("the gate");
    ctx.set_presence(Some(activity), serenity::OnlineStatus::Online);
}
