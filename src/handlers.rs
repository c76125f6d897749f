//! Gateway event handlers.
//!
//! One function per event the bot reacts to. Handlers log and swallow
//! failures that only affect a single event; nothing here stops the loop.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::autorole::{
    assign_eligible_roles, failure_summary, granted_names, load_role_configs, AutoRole,
    MemberProfile, RoleConfig,
};
use crate::bot::Bot;
use crate::commands::{self, AutoroleAction, AUTOROLE_COMMAND};
use crate::http::HttpError;
use crate::types::*;

// ---------------------------------------------------------------------------
// READY / GUILD_CREATE
// ---------------------------------------------------------------------------

/// Record identity and register slash commands on the first READY.
pub async fn on_ready(bot: &mut Bot, ready: ReadyEvent) {
    info!(user = %ready.user.tag(), guilds = ready.guilds.len(), "bot is ready");

    bot.state.bot_user_id = Some(ready.user.id);
    bot.state.application_id = Some(ready.application.id.clone());

    if bot.state.commands_registered {
        return;
    }

    let app_id = ready.application.id;
    let cmds = commands::slash_commands();
    let result = match bot.command_guild_id.as_deref() {
        Some(guild_id) => {
            bot.http
                .bulk_overwrite_guild_commands(&app_id, guild_id, &cmds)
                .await
        }
        None => bot.http.bulk_overwrite_global_commands(&app_id, &cmds).await,
    };

    match result {
        Ok(registered) => {
            info!(
                count = registered.len(),
                guild = ?bot.command_guild_id,
                "registered slash commands"
            );
            bot.state.commands_registered = true;
        }
        Err(e) => warn!(error = %e, "failed to register slash commands"),
    }
}

pub fn on_guild_create(guild: &Guild) {
    info!(
        guild_id = %guild.id,
        guild = %guild.name,
        roles = guild.roles.len(),
        members = ?guild.member_count,
        "guild available"
    );
}

// ---------------------------------------------------------------------------
// GUILD_MEMBER_ADD
// ---------------------------------------------------------------------------

/// Grant every configured auto-role the new member qualifies for.
pub async fn on_guild_member_add(bot: &Bot, add: GuildMemberAdd) {
    let Some(user) = add.member.user.as_ref() else {
        warn!(guild_id = %add.guild_id, "member join without user object");
        return;
    };

    let enabled = match bot.store.autorole_enabled() {
        Ok(enabled) => enabled,
        Err(e) => {
            error!(error = %e, "failed to read auto-role flag");
            return;
        }
    };
    let stored = if enabled {
        match bot.store.auto_roles() {
            Ok(roles) => roles,
            Err(e) => {
                error!(error = %e, "failed to read auto-role list");
                return;
            }
        }
    } else {
        Vec::new()
    };

    let Some((profile, roles)) = plan_member_join(enabled, &stored, user) else {
        return;
    };

    let http = &bot.http;
    let guild_id = add.guild_id.as_str();
    let user_id = user.id.as_str();

    let outcomes = assign_eligible_roles(&profile, &roles, Utc::now(), |role_id| async move {
        http.add_member_role(guild_id, user_id, &role_id).await
    })
    .await;

    let granted = granted_names(&outcomes);
    let failed = failure_summary(&outcomes);
    if !granted.is_empty() {
        info!(
            user = %user.tag(),
            guild_id = %add.guild_id,
            count = granted.len(),
            roles = %granted.join(", "),
            "auto-assigned roles to new member"
        );
    }
    if !failed.is_empty() {
        warn!(
            user = %user.tag(),
            guild_id = %add.guild_id,
            failed = %failed.join(", "),
            "failed to assign some auto-roles"
        );
    }
}

/// Decide whether a join gets an auto-role pass, and with what inputs.
///
/// `None` when the feature is off, the user is a bot, nothing is
/// configured, or the account creation time cannot be decoded.
fn plan_member_join(
    enabled: bool,
    stored: &[AutoRole],
    user: &User,
) -> Option<(MemberProfile, Vec<RoleConfig>)> {
    if user.bot {
        debug!(user = %user.tag(), "skipping auto-roles for bot account");
        return None;
    }
    if !enabled || stored.is_empty() {
        return None;
    }
    let Some(profile) = MemberProfile::from_user(user) else {
        warn!(user_id = %user.id, "could not decode account creation time");
        return None;
    };
    Some((profile, load_role_configs(stored)))
}

// ---------------------------------------------------------------------------
// INTERACTION_CREATE
// ---------------------------------------------------------------------------

pub async fn on_interaction(bot: &Bot, interaction: &Interaction) -> Result<(), HttpError> {
    let reply = match interaction.kind {
        InteractionType::Ping => {
            let pong = InteractionResponse {
                kind: InteractionCallbackType::Pong,
                data: None,
            };
            return bot
                .http
                .create_interaction_response(&interaction.id, &interaction.token, &pong)
                .await;
        }
        InteractionType::ApplicationCommand => match command_name(interaction) {
            Some(AUTOROLE_COMMAND) => handle_autorole(bot, interaction).await,
            other => {
                debug!(command = ?other, "ignoring unknown command");
                return Ok(());
            }
        },
        _ => return Ok(()),
    };

    bot.http
        .create_interaction_response(
            &interaction.id,
            &interaction.token,
            &InteractionResponse::message(reply),
        )
        .await
}

fn command_name(interaction: &Interaction) -> Option<&str> {
    interaction.data.as_ref()?.name.as_deref()
}

async fn handle_autorole(bot: &Bot, interaction: &Interaction) -> InteractionCallbackData {
    if interaction.guild_id.is_none() {
        return InteractionCallbackData::ephemeral_text("❌ This command only works in a server.");
    }
    if let Err(denied) = commands::authorize(interaction, &bot.role_ids) {
        info!(
            user = ?interaction.author().map(User::tag),
            "autorole command denied"
        );
        return denied;
    }

    let action = match interaction
        .data
        .as_ref()
        .ok_or(commands::CommandError::MissingData)
        .and_then(AutoroleAction::from_data)
    {
        Ok(action) => action,
        Err(e) => {
            warn!(error = %e, "malformed autorole invocation");
            return InteractionCallbackData::ephemeral_text(format!("❌ {}", e));
        }
    };

    let bot_position = if action.needs_bot_position() {
        bot_highest_position(bot, interaction).await
    } else {
        None
    };

    info!(
        subcommand = action.name(),
        user = ?interaction.author().map(User::tag),
        "running autorole command"
    );
    commands::execute(&bot.store, &action, bot_position, Utc::now())
}

/// The bot's highest role position in the interaction's guild.
async fn bot_highest_position(bot: &Bot, interaction: &Interaction) -> Option<i64> {
    let guild_id = interaction.guild_id.as_deref()?;
    let bot_id = bot
        .state
        .bot_user_id
        .as_deref()
        .unwrap_or(&interaction.application_id);

    let member = bot.http.get_guild_member(guild_id, bot_id).await;
    let roles = bot.http.get_guild_roles(guild_id).await;
    match (member, roles) {
        (Ok(member), Ok(roles)) => Some(commands::highest_role_position(&roles, &member.roles)),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, guild_id, "could not look up the bot's roles");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interaction(value: serde_json::Value) -> Interaction {
        serde_json::from_value(value).unwrap()
    }

    // -- member join -----------------------------------------------------------

    fn user(id: &str, bot: bool) -> User {
        serde_json::from_value(json!({ "id": id, "username": "newbie", "bot": bot })).unwrap()
    }

    fn roles() -> Vec<AutoRole> {
        vec![AutoRole::new("1", "Member"), AutoRole::new("2", "Veteran")]
    }

    #[test]
    fn join_plan_builds_profile_and_configs() {
        let (profile, configs) =
            plan_member_join(true, &roles(), &user("175928847299117063", false)).unwrap();
        assert_eq!(profile.username, "newbie");
        assert_eq!(
            profile.account_created_at,
            crate::types::snowflake_created_at("175928847299117063").unwrap()
        );
        let ids: Vec<_> = configs.iter().map(|r| r.role_id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn join_plan_is_skipped_when_disabled_or_empty() {
        let member = user("175928847299117063", false);
        assert!(plan_member_join(false, &roles(), &member).is_none());
        assert!(plan_member_join(true, &[], &member).is_none());
    }

    #[test]
    fn join_plan_skips_bots() {
        assert!(plan_member_join(true, &roles(), &user("175928847299117063", true)).is_none());
    }

    #[test]
    fn join_plan_needs_a_decodable_snowflake() {
        assert!(plan_member_join(true, &roles(), &user("not-a-snowflake", false)).is_none());
    }

    // -- interactions ------------------------------------------------------------

    #[test]
    fn command_name_reads_data() {
        let i = interaction(json!({
            "id": "1", "application_id": "2", "type": 2, "token": "t",
            "data": { "id": "3", "name": "autorole", "options": [] }
        }));
        assert_eq!(command_name(&i), Some("autorole"));

        let i = interaction(json!({
            "id": "1", "application_id": "2", "type": 1, "token": "t"
        }));
        assert_eq!(command_name(&i), None);
    }
}
