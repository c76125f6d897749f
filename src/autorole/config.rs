//! Stored auto-role entries and their loaded, typed form.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use super::condition::{Condition, ConditionSpec};
use crate::types::Snowflake;

/// One entry of the `auto_roles` settings blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRole {
    pub id: Snowflake,
    pub name: String,
    /// Keyed by condition kind; at most one condition per kind. A stored
    /// `null` reads as no conditions.
    #[serde(default, deserialize_with = "nullable_conditions")]
    pub conditions: BTreeMap<String, ConditionSpec>,
}

fn nullable_conditions<'de, D>(deserializer: D) -> Result<BTreeMap<String, ConditionSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let conditions: Option<BTreeMap<String, ConditionSpec>> = Option::deserialize(deserializer)?;
    Ok(conditions.unwrap_or_default())
}

impl AutoRole {
    pub fn new(id: impl Into<Snowflake>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            conditions: BTreeMap::new(),
        }
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }
}

/// A role with its conditions compiled, ready for evaluation.
#[derive(Debug, Clone)]
pub struct RoleConfig {
    pub role_id: Snowflake,
    pub role_name: String,
    pub conditions: Vec<Condition>,
}

impl RoleConfig {
    pub fn new(role_id: impl Into<Snowflake>, role_name: impl Into<String>) -> Self {
        Self {
            role_id: role_id.into(),
            role_name: role_name.into(),
            conditions: Vec::new(),
        }
    }

    /// Compile a stored entry. Unknown or unloadable conditions are logged.
    pub fn from_stored(role: &AutoRole) -> Self {
        let conditions = role
            .conditions
            .iter()
            .map(|(kind, spec)| {
                let condition = Condition::load(kind, spec);
                match &condition {
                    Condition::Unknown { kind } => warn!(
                        role_id = %role.id,
                        kind = %kind,
                        "unknown auto-role condition kind; treating as satisfied"
                    ),
                    Condition::Invalid { kind, reason } => warn!(
                        role_id = %role.id,
                        kind = %kind,
                        reason = %reason,
                        "stored auto-role condition is invalid; role will not be granted"
                    ),
                    _ => {}
                }
                condition
            })
            .collect();

        Self {
            role_id: role.id.clone(),
            role_name: role.name.clone(),
            conditions,
        }
    }

    /// Add a condition, replacing any existing one of the same kind.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions
            .retain(|existing| existing.kind_name() != condition.kind_name());
        self.conditions.push(condition);
        self
    }
}

/// Compile a whole stored list, preserving order.
pub fn load_role_configs(roles: &[AutoRole]) -> Vec<RoleConfig> {
    roles.iter().map(RoleConfig::from_stored).collect()
}
