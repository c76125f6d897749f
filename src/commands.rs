//! The `/autorole` slash command: definition, option parsing, and replies.
//!
//! Everything here is synchronous and talks only to the [`Store`]; the one
//! piece of live guild state a subcommand needs (the bot's highest role
//! position for `add`) is fetched by the caller and passed in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info};

use crate::autorole::{
    describe, kind_display_name, Condition, ConditionKind, ConditionSpec, Operator,
};
use crate::permissions::{PermissionLevel, RoleIds};
use crate::store::{Store, StoreError};
use crate::types::*;

pub const AUTOROLE_COMMAND: &str = "autorole";

/// Pseudo condition type that wipes every condition of a role.
pub const CLEAR_CONDITIONS: &str = "clear";

/// Level a member needs to run `/autorole`.
pub const REQUIRED_LEVEL: PermissionLevel = PermissionLevel::Admin;

const COLOR_ENABLED: u32 = 0x00FF00;
const COLOR_DISABLED: u32 = 0xFF0000;
const COLOR_CONDITIONS: u32 = 0x3498DB;

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// Every slash command this bot registers.
pub fn slash_commands() -> Vec<ApplicationCommand> {
    vec![autorole_command()]
}

pub fn autorole_command() -> ApplicationCommand {
    use CommandOptionType as T;

    let role = |desc: &str| ApplicationCommandOption::new(T::Role, "role", desc).required();

    let mut condition_type =
        ApplicationCommandOption::new(T::String, "condition_type", "The type of condition to set")
            .required();
    for kind in ConditionKind::ALL {
        let label = match kind {
            ConditionKind::UsernameRegex => "Username Regex",
            other => other.display_name(),
        };
        condition_type = condition_type.choice(label, kind.as_str());
    }
    condition_type = condition_type.choice("Clear All Conditions", CLEAR_CONDITIONS);

    let mut operator = ApplicationCommandOption::new(
        T::String,
        "operator",
        "Comparison operator (for numeric conditions)",
    );
    for op in Operator::ALL {
        operator = operator.choice(
            format!("{} ({})", title_case(op.phrase()), op.symbol()),
            op.symbol(),
        );
    }

    ApplicationCommand::chat_input(AUTOROLE_COMMAND, "Manage auto-roles for new server members")
        .default_permissions(Permissions::MANAGE_ROLES)
        .option(ApplicationCommandOption::subcommand(
            "enable",
            "Enable auto-role assignment for new members",
            vec![],
        ))
        .option(ApplicationCommandOption::subcommand(
            "disable",
            "Disable auto-role assignment for new members",
            vec![],
        ))
        .option(ApplicationCommandOption::subcommand(
            "add",
            "Add a role to be automatically assigned to new members",
            vec![role("The role to add to auto-roles")],
        ))
        .option(ApplicationCommandOption::subcommand(
            "remove",
            "Remove a role from auto-roles",
            vec![role("The role to remove from auto-roles")],
        ))
        .option(ApplicationCommandOption::subcommand(
            "list",
            "List all roles that are automatically assigned to new members",
            vec![],
        ))
        .option(ApplicationCommandOption::subcommand(
            "set_condition",
            "Set conditions for when an auto-role is assigned",
            vec![
                role("The role to set conditions for"),
                condition_type,
                ApplicationCommandOption::new(
                    T::String,
                    "condition_value",
                    "The value for the condition (required for all except \"Clear All Conditions\")",
                ),
                operator,
            ],
        ))
        .option(ApplicationCommandOption::subcommand(
            "view_conditions",
            "View the conditions for a specific auto-role",
            vec![role("The role to view conditions for")],
        ))
}

fn title_case(phrase: &str) -> String {
    phrase
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("interaction carries no command data")]
    MissingData,

    #[error("unknown subcommand `{0}`")]
    UnknownSubcommand(String),

    #[error("missing required option `{0}`")]
    MissingOption(&'static str),
}

/// A parsed `/autorole` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AutoroleAction {
    Enable,
    Disable,
    Add {
        role: Role,
    },
    Remove {
        role: Role,
    },
    List,
    SetCondition {
        role: Role,
        condition_type: String,
        value: Option<String>,
        operator: Option<String>,
    },
    ViewConditions {
        role: Role,
    },
}

impl AutoroleAction {
    pub fn from_data(data: &InteractionData) -> Result<Self, CommandError> {
        let sub = data
            .options
            .iter()
            .find(|o| o.kind == CommandOptionType::SubCommand)
            .ok_or(CommandError::MissingData)?;
        let resolved = data.resolved.as_ref();

        let role = || -> Result<Role, CommandError> {
            let id = string_option(&sub.options, "role").ok_or(CommandError::MissingOption("role"))?;
            resolved
                .and_then(|r| r.roles.get(id))
                .cloned()
                .ok_or(CommandError::MissingOption("role"))
        };

        Ok(match sub.name.as_str() {
            "enable" => AutoroleAction::Enable,
            "disable" => AutoroleAction::Disable,
            "add" => AutoroleAction::Add { role: role()? },
            "remove" => AutoroleAction::Remove { role: role()? },
            "list" => AutoroleAction::List,
            "set_condition" => AutoroleAction::SetCondition {
                role: role()?,
                condition_type: string_option(&sub.options, "condition_type")
                    .ok_or(CommandError::MissingOption("condition_type"))?
                    .to_string(),
                value: string_option(&sub.options, "condition_value").map(str::to_string),
                operator: string_option(&sub.options, "operator").map(str::to_string),
            },
            "view_conditions" => AutoroleAction::ViewConditions { role: role()? },
            other => return Err(CommandError::UnknownSubcommand(other.to_string())),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            AutoroleAction::Enable => "enable",
            AutoroleAction::Disable => "disable",
            AutoroleAction::Add { .. } => "add",
            AutoroleAction::Remove { .. } => "remove",
            AutoroleAction::List => "list",
            AutoroleAction::SetCondition { .. } => "set_condition",
            AutoroleAction::ViewConditions { .. } => "view_conditions",
        }
    }

    /// Whether running this action needs the bot's highest role position.
    pub fn needs_bot_position(&self) -> bool {
        matches!(self, AutoroleAction::Add { .. })
    }
}

fn string_option<'a>(options: &'a [CommandOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(CommandOption::as_str)
}

// ---------------------------------------------------------------------------
// Gating
// ---------------------------------------------------------------------------

/// Check the invoker's level and the bot's own permissions. Returns the
/// reply to send when the command must not run.
pub fn authorize(
    interaction: &Interaction,
    role_ids: &RoleIds,
) -> Result<(), InteractionCallbackData> {
    if !role_ids.check(interaction.member_roles(), REQUIRED_LEVEL) {
        return Err(InteractionCallbackData::ephemeral_text(
            REQUIRED_LEVEL.denial_message(),
        ));
    }
    if !interaction.bot_permissions().allows(Permissions::MANAGE_ROLES) {
        return Err(InteractionCallbackData::ephemeral_text(
            "❌ I need the \"Manage Roles\" permission to manage auto-roles.",
        ));
    }
    Ok(())
}

/// Highest position among the roles a member holds; `0` (the `@everyone`
/// position) when they hold none that are known.
pub fn highest_role_position(guild_roles: &[Role], member_role_ids: &[Snowflake]) -> i64 {
    guild_roles
        .iter()
        .filter(|role| member_role_ids.contains(&role.id))
        .map(|role| role.position)
        .max()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run one action against the store and build its (ephemeral) reply.
///
/// `bot_position` is the bot's highest role position, required by `add`.
pub fn execute(
    store: &Store,
    action: &AutoroleAction,
    bot_position: Option<i64>,
    now: DateTime<Utc>,
) -> InteractionCallbackData {
    match run(store, action, bot_position, now) {
        Ok(reply) => reply,
        Err(err) => {
            error!(subcommand = action.name(), error = %err, "autorole command failed");
            InteractionCallbackData::ephemeral_text(format!("❌ An error occurred: {}", err))
        }
    }
}

fn run(
    store: &Store,
    action: &AutoroleAction,
    bot_position: Option<i64>,
    now: DateTime<Utc>,
) -> Result<InteractionCallbackData, StoreError> {
    let reply = match action {
        AutoroleAction::Enable => {
            store.set_autorole_enabled(true)?;
            info!("auto-role assignment enabled");
            text("✅ Auto-role assignment has been **enabled**. New members will automatically receive configured roles.")
        }
        AutoroleAction::Disable => {
            store.set_autorole_enabled(false)?;
            info!("auto-role assignment disabled");
            text("✅ Auto-role assignment has been **disabled**. New members will not receive automatic roles.")
        }
        AutoroleAction::Add { role } => add(store, role, bot_position)?,
        AutoroleAction::Remove { role } => match store.remove_auto_role(&role.id) {
            Ok(()) => {
                info!(role_id = %role.id, role = %role.name, "auto-role removed");
                text(format!(
                    "✅ The role **{}** has been removed from auto-roles.",
                    role.name
                ))
            }
            Err(StoreError::NotFound) => text(format!(
                "⚠️ The role **{}** is not in the auto-roles list.",
                role.name
            )),
            Err(err) => return Err(err),
        },
        AutoroleAction::List => list(store, now)?,
        AutoroleAction::SetCondition {
            role,
            condition_type,
            value,
            operator,
        } => set_condition(
            store,
            role,
            condition_type,
            value.as_deref(),
            operator.as_deref(),
        )?,
        AutoroleAction::ViewConditions { role } => view_conditions(store, role, now)?,
    };
    Ok(reply)
}

fn text(content: impl Into<String>) -> InteractionCallbackData {
    InteractionCallbackData::ephemeral_text(content)
}

fn add(
    store: &Store,
    role: &Role,
    bot_position: Option<i64>,
) -> Result<InteractionCallbackData, StoreError> {
    let Some(bot_position) = bot_position else {
        return Ok(text(format!(
            "❌ I could not determine my highest role, so I cannot add **{}**.",
            role.name
        )));
    };
    if role.position >= bot_position {
        return Ok(text(format!(
            "❌ I cannot assign the role {} because it is positioned higher than or equal to my highest role.",
            role.name
        )));
    }

    match store.add_auto_role(&role.id, &role.name) {
        Ok(()) => {
            info!(role_id = %role.id, role = %role.name, "auto-role added");
            Ok(text(format!(
                "✅ The role **{}** has been added to auto-roles. New members will now receive this role automatically.\n\nYou can set conditions for this role with `/autorole set_condition`.",
                role.name
            )))
        }
        Err(StoreError::AlreadyExists) => Ok(text(format!(
            "⚠️ The role **{}** is already in the auto-roles list.",
            role.name
        ))),
        Err(err) => Err(err),
    }
}

fn set_condition(
    store: &Store,
    role: &Role,
    condition_type: &str,
    value: Option<&str>,
    operator: Option<&str>,
) -> Result<InteractionCallbackData, StoreError> {
    let Some(existing) = store.auto_role(&role.id)? else {
        return Ok(text(format!(
            "❌ The role **{}** is not in the auto-roles list. Add it first with `/autorole add`.",
            role.name
        )));
    };

    if condition_type == CLEAR_CONDITIONS {
        store.set_auto_role_conditions(&role.id, BTreeMap::new())?;
        info!(role_id = %role.id, "auto-role conditions cleared");
        return Ok(text(format!(
            "✅ All conditions for the role **{}** have been cleared. It will now be assigned to all new members.",
            role.name
        )));
    }

    let validated = condition_type
        .parse::<ConditionKind>()
        .and_then(|kind| Condition::parse(kind, value, operator).map(|_| kind));
    let kind = match validated {
        Ok(kind) => kind,
        Err(err) => return Ok(text(format!("❌ {}", capitalize(&err.to_string())))),
    };

    let operator = kind
        .is_numeric()
        .then(|| operator.and_then(|op| op.parse::<Operator>().ok()))
        .flatten();
    let value = value.unwrap_or_default();
    let value = match kind {
        ConditionKind::UsernameContains | ConditionKind::UsernameRegex => value,
        _ => value.trim(),
    };
    let spec = ConditionSpec::new(value, operator);
    let description = describe(kind.as_str(), &spec);

    let mut conditions = existing.conditions;
    conditions.insert(kind.as_str().to_string(), spec);
    store.set_auto_role_conditions(&role.id, conditions)?;
    info!(role_id = %role.id, kind = %kind, "auto-role condition set");

    Ok(text(format!(
        "✅ Condition set for role **{}**:\n{}",
        role.name, description
    )))
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

fn view_conditions(
    store: &Store,
    role: &Role,
    now: DateTime<Utc>,
) -> Result<InteractionCallbackData, StoreError> {
    let Some(stored) = store.auto_role(&role.id)? else {
        return Ok(text(format!(
            "❌ The role **{}** is not in the auto-roles list.",
            role.name
        )));
    };

    let mut embed = Embed::new()
        .title(format!("📋 Conditions for {}", role.name))
        .color(COLOR_CONDITIONS)
        .timestamp(now);

    if stored.conditions.is_empty() {
        embed = embed.description(
            "No conditions are set for this role. It will be assigned to all new members.",
        );
    } else {
        embed = embed.description(
            "The following conditions must be met for a new member to receive this role:",
        );
        for (kind, spec) in &stored.conditions {
            embed = embed.field(kind_display_name(kind), describe(kind, spec), false);
        }
    }

    Ok(InteractionCallbackData::ephemeral_embed(embed))
}

fn list(store: &Store, now: DateTime<Utc>) -> Result<InteractionCallbackData, StoreError> {
    let enabled = store.autorole_enabled()?;
    let roles = store.auto_roles()?;

    let mut embed = Embed::new()
        .title("📋 Auto-Role Configuration")
        .color(if enabled { COLOR_ENABLED } else { COLOR_DISABLED })
        .description(format!(
            "Auto-role assignment is currently **{}**",
            if enabled { "ENABLED" } else { "DISABLED" }
        ))
        .timestamp(now);

    if roles.is_empty() {
        embed = embed.field(
            "Configured Roles",
            "No roles configured. Add roles with `/autorole add`",
            false,
        );
    } else {
        let lines: Vec<String> = roles
            .iter()
            .map(|role| {
                format!(
                    "• <@&{}> ({}){}",
                    role.id,
                    role.name,
                    if role.has_conditions() { " [Has Conditions]" } else { "" }
                )
            })
            .collect();
        embed = embed
            .field("Configured Roles", lines.join("\n"), false)
            .field(
                "Viewing & Setting Conditions",
                "Use `/autorole view_conditions` to see conditions for a role\nUse `/autorole set_condition` to configure when a role is assigned",
                false,
            );
    }

    Ok(InteractionCallbackData::ephemeral_embed(embed))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap()
    }

    fn role(id: &str, name: &str, position: i64) -> Role {
        serde_json::from_value(json!({ "id": id, "name": name, "position": position })).unwrap()
    }

    fn content(reply: &InteractionCallbackData) -> &str {
        reply.content.as_deref().unwrap_or_default()
    }

    fn set(store: &Store, role: &Role, kind: &str, value: Option<&str>, op: Option<&str>) -> InteractionCallbackData {
        execute(
            store,
            &AutoroleAction::SetCondition {
                role: role.clone(),
                condition_type: kind.to_string(),
                value: value.map(str::to_string),
                operator: op.map(str::to_string),
            },
            None,
            now(),
        )
    }

    // -- definition --------------------------------------------------------------

    #[test]
    fn definition_has_all_subcommands() {
        let cmd = autorole_command();
        assert_eq!(cmd.name, "autorole");
        assert_eq!(
            cmd.default_member_permissions.as_deref(),
            Some(Permissions::MANAGE_ROLES.bits().to_string().as_str())
        );
        let names: Vec<_> = cmd.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            ["enable", "disable", "add", "remove", "list", "set_condition", "view_conditions"]
        );

        let set_condition = &cmd.options[5];
        let kinds: Vec<_> = set_condition.options[1]
            .choices
            .iter()
            .map(|c| c.value.clone())
            .collect();
        assert_eq!(kinds.len(), 6);
        assert_eq!(kinds[5], json!("clear"));
        assert_eq!(set_condition.options[3].choices[3].name, "Greater Than Or Equal To (>=)");
    }

    // -- parsing -------------------------------------------------------------------

    #[test]
    fn parses_set_condition_with_resolved_role() {
        let data: InteractionData = serde_json::from_value(json!({
            "id": "1",
            "name": "autorole",
            "options": [{
                "name": "set_condition",
                "type": 1,
                "options": [
                    { "name": "role", "type": 8, "value": "55" },
                    { "name": "condition_type", "type": 3, "value": "account_age" },
                    { "name": "condition_value", "type": 3, "value": "30" },
                    { "name": "operator", "type": 3, "value": ">=" }
                ]
            }],
            "resolved": { "roles": { "55": { "id": "55", "name": "Veteran", "position": 3 } } }
        }))
        .unwrap();

        let action = AutoroleAction::from_data(&data).unwrap();
        match action {
            AutoroleAction::SetCondition {
                role,
                condition_type,
                value,
                operator,
            } => {
                assert_eq!(role.name, "Veteran");
                assert_eq!(condition_type, "account_age");
                assert_eq!(value.as_deref(), Some("30"));
                assert_eq!(operator.as_deref(), Some(">="));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_subcommand_and_missing_role() {
        let data: InteractionData = serde_json::from_value(json!({
            "options": [{ "name": "explode", "type": 1 }]
        }))
        .unwrap();
        assert_eq!(
            AutoroleAction::from_data(&data),
            Err(CommandError::UnknownSubcommand("explode".into()))
        );

        let data: InteractionData = serde_json::from_value(json!({
            "options": [{ "name": "add", "type": 1, "options": [] }]
        }))
        .unwrap();
        assert_eq!(
            AutoroleAction::from_data(&data),
            Err(CommandError::MissingOption("role"))
        );
    }

    // -- gating ----------------------------------------------------------------------

    #[test]
    fn authorize_checks_level_then_bot_permission() {
        let ids = RoleIds {
            admin: Some("900".into()),
            ..Default::default()
        };
        let mut interaction: Interaction = serde_json::from_value(json!({
            "id": "1",
            "application_id": "2",
            "type": 2,
            "token": "t",
            "member": { "roles": ["123"] },
            "app_permissions": Permissions::MANAGE_ROLES.bits().to_string()
        }))
        .unwrap();

        let denied = authorize(&interaction, &ids).unwrap_err();
        assert_eq!(
            content(&denied),
            "❌ This command requires administrator permissions."
        );
        assert_eq!(denied.flags, Some(EPHEMERAL));

        if let Some(member) = interaction.member.as_mut() {
            member.roles.push("900".into());
        }
        assert!(authorize(&interaction, &ids).is_ok());

        interaction.app_permissions = Some("0".into());
        let denied = authorize(&interaction, &ids).unwrap_err();
        assert!(content(&denied).contains("Manage Roles"));
    }

    #[test]
    fn highest_position_ignores_unheld_roles() {
        let roles = vec![role("1", "a", 5), role("2", "b", 9), role("3", "c", 2)];
        assert_eq!(highest_role_position(&roles, &["1".into(), "3".into()]), 5);
        assert_eq!(highest_role_position(&roles, &[]), 0);
    }

    // -- subcommands -------------------------------------------------------------------

    #[test]
    fn enable_and_disable_toggle_flag() {
        let store = Store::in_memory().unwrap();
        let reply = execute(&store, &AutoroleAction::Enable, None, now());
        assert!(content(&reply).contains("**enabled**"));
        assert!(store.autorole_enabled().unwrap());

        execute(&store, &AutoroleAction::Disable, None, now());
        assert!(!store.autorole_enabled().unwrap());
    }

    #[test]
    fn add_refuses_roles_at_or_above_bot() {
        let store = Store::in_memory().unwrap();
        let high = role("7", "High", 10);

        let reply = execute(&store, &AutoroleAction::Add { role: high.clone() }, Some(10), now());
        assert!(content(&reply).contains("positioned higher than or equal to my highest role"));
        assert!(store.auto_roles().unwrap().is_empty());

        let reply = execute(&store, &AutoroleAction::Add { role: high.clone() }, None, now());
        assert!(content(&reply).starts_with("❌"));
        assert!(store.auto_roles().unwrap().is_empty());

        let reply = execute(&store, &AutoroleAction::Add { role: high.clone() }, Some(11), now());
        assert!(content(&reply).starts_with("✅"));

        let reply = execute(&store, &AutoroleAction::Add { role: high }, Some(11), now());
        assert!(content(&reply).contains("already in the auto-roles list"));
    }

    #[test]
    fn remove_reports_missing_role() {
        let store = Store::in_memory().unwrap();
        let r = role("7", "Gone", 1);
        let reply = execute(&store, &AutoroleAction::Remove { role: r }, None, now());
        assert_eq!(
            content(&reply),
            "⚠️ The role **Gone** is not in the auto-roles list."
        );
    }

    #[test]
    fn set_condition_validates_and_describes() {
        let store = Store::in_memory().unwrap();
        let r = role("7", "Veteran", 1);

        let reply = set(&store, &r, "account_age", Some("30"), Some(">="));
        assert!(content(&reply).contains("not in the auto-roles list"));

        store.add_auto_role("7", "Veteran").unwrap();

        let reply = set(&store, &r, "account_age", Some("30"), None);
        assert_eq!(
            content(&reply),
            "❌ An operator is required for numeric conditions"
        );

        let reply = set(&store, &r, "username_regex", Some("[abc"), None);
        assert!(content(&reply).starts_with("❌ Invalid regular expression"));

        let reply = set(&store, &r, "account_age", Some("30"), Some(">="));
        assert_eq!(
            content(&reply),
            "✅ Condition set for role **Veteran**:\nAccount must be greater than or equal to 30 days old"
        );

        let reply = set(&store, &r, "creation_month", Some("6"), None);
        assert!(content(&reply).ends_with("Account must be created in month: June"));

        let stored = store.auto_role("7").unwrap().unwrap();
        assert_eq!(stored.conditions.len(), 2);
        assert_eq!(stored.conditions["creation_month"].operator.as_deref(), Some("="));

        let reply = set(&store, &r, "clear", None, None);
        assert!(content(&reply).contains("have been cleared"));
        assert!(!store.auto_role("7").unwrap().unwrap().has_conditions());
    }

    #[test]
    fn set_condition_trims_only_numeric_values() {
        let store = Store::in_memory().unwrap();
        let r = role("7", "Mods", 1);
        store.add_auto_role("7", "Mods").unwrap();

        set(&store, &r, "username_contains", Some(" mod"), None);
        set(&store, &r, "account_age", Some(" 30 "), Some(">"));

        let stored = store.auto_role("7").unwrap().unwrap();
        assert_eq!(stored.conditions["username_contains"].value, " mod");
        assert_eq!(stored.conditions["account_age"].value, "30");
    }

    #[test]
    fn list_renders_enabled_state_and_roles() {
        let store = Store::in_memory().unwrap();
        let reply = execute(&store, &AutoroleAction::List, None, now());
        let embed = &reply.embeds.as_ref().unwrap()[0];
        assert_eq!(embed.color, Some(COLOR_DISABLED));
        assert!(embed.fields[0].value.starts_with("No roles configured"));

        store.set_autorole_enabled(true).unwrap();
        store.add_auto_role("1", "Member").unwrap();
        store.add_auto_role("2", "Veteran").unwrap();
        let mut conditions = BTreeMap::new();
        conditions.insert("account_age".into(), ConditionSpec::new("365", Some(Operator::Greater)));
        store.set_auto_role_conditions("2", conditions).unwrap();

        let reply = execute(&store, &AutoroleAction::List, None, now());
        assert_eq!(reply.flags, Some(EPHEMERAL));
        let embed = &reply.embeds.as_ref().unwrap()[0];
        assert_eq!(embed.color, Some(COLOR_ENABLED));
        assert_eq!(
            embed.description.as_deref(),
            Some("Auto-role assignment is currently **ENABLED**")
        );
        assert_eq!(
            embed.fields[0].value,
            "• <@&1> (Member)\n• <@&2> (Veteran) [Has Conditions]"
        );
    }

    #[test]
    fn view_conditions_lists_each_kind() {
        let store = Store::in_memory().unwrap();
        store.add_auto_role("2", "Veteran").unwrap();
        let r = role("2", "Veteran", 1);
        set(&store, &r, "creation_year", Some("2023"), Some("<"));

        let reply = execute(&store, &AutoroleAction::ViewConditions { role: r }, None, now());
        let embed = &reply.embeds.as_ref().unwrap()[0];
        assert_eq!(embed.color, Some(COLOR_CONDITIONS));
        assert_eq!(embed.title.as_deref(), Some("📋 Conditions for Veteran"));
        assert_eq!(embed.fields[0].name, "Account Creation Year");
        assert_eq!(
            embed.fields[0].value,
            "Account creation year must be less than 2023"
        );
    }
}
