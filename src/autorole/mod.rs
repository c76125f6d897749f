//! Conditional auto-role engine.
//!
//! Stored entries ([`AutoRole`]) are compiled into [`RoleConfig`]s, each
//! carrying typed [`Condition`]s. [`evaluate`] decides eligibility for a
//! [`MemberProfile`]; [`assign_eligible_roles`] walks a role list and grants.

mod assign;
mod condition;
mod config;
mod evaluate;

pub use assign::{assign_eligible_roles, failure_summary, granted_names, AssignmentOutcome};
pub use condition::{
    describe, kind_display_name, month_name, Condition, ConditionError, ConditionKind,
    ConditionSpec, Operator,
};
pub use config::{load_role_configs, AutoRole, RoleConfig};
pub use evaluate::{account_age_days, evaluate, MemberProfile};
