//! Role-based permission levels for bot commands.

use serde::{Deserialize, Serialize};

use crate::types::Snowflake;

/// Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionLevel {
    User,
    Helper,
    Staff,
    Moderator,
    Admin,
    Owner,
}

impl PermissionLevel {
    pub fn description(self) -> &'static str {
        match self {
            PermissionLevel::User => "This command can be used by any server member",
            PermissionLevel::Helper => "This command requires helper status",
            PermissionLevel::Staff => "This command requires staff permissions",
            PermissionLevel::Moderator => "This command requires moderator permissions",
            PermissionLevel::Admin => "This command requires administrator permissions",
            PermissionLevel::Owner => "This command can only be used by the bot owner",
        }
    }

    /// Reply shown to a member who lacks this level.
    pub fn denial_message(self) -> String {
        format!("❌ {}.", self.description())
    }
}

/// Discord role ids that confer each elevated level. Unset levels are
/// unreachable through roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleIds {
    pub owner: Option<Snowflake>,
    pub admin: Option<Snowflake>,
    pub moderator: Option<Snowflake>,
    pub staff: Option<Snowflake>,
    pub helper: Option<Snowflake>,
}

impl RoleIds {
    /// The highest level granted by any of `member_roles`.
    pub fn level_for(&self, member_roles: &[Snowflake]) -> PermissionLevel {
        let holds = |id: &Option<Snowflake>| {
            id.as_ref()
                .is_some_and(|id| member_roles.iter().any(|r| r == id))
        };

        [
            (&self.owner, PermissionLevel::Owner),
            (&self.admin, PermissionLevel::Admin),
            (&self.moderator, PermissionLevel::Moderator),
            (&self.staff, PermissionLevel::Staff),
            (&self.helper, PermissionLevel::Helper),
        ]
        .into_iter()
        .find(|(id, _)| holds(id))
        .map_or(PermissionLevel::User, |(_, level)| level)
    }

    pub fn check(&self, member_roles: &[Snowflake], required: PermissionLevel) -> bool {
        self.level_for(member_roles) >= required
    }
}
