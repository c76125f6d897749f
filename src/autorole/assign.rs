//! Grant every eligible role to a joining member.

use std::fmt::Display;
use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::config::RoleConfig;
use super::evaluate::{evaluate, MemberProfile};
use crate::types::Snowflake;

/// What happened to one configured role during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentOutcome {
    pub role_id: Snowflake,
    pub role_name: String,
    pub eligible: bool,
    /// Set only when the member was eligible and the grant failed.
    pub failure_reason: Option<String>,
}

impl AssignmentOutcome {
    pub fn granted(&self) -> bool {
        self.eligible && self.failure_reason.is_none()
    }
}

/// Evaluate each role in order and call `grant` for the eligible ones.
///
/// Grants are awaited one at a time. A failed grant is recorded on its
/// outcome and the pass moves on to the next role.
pub async fn assign_eligible_roles<F, Fut, E>(
    profile: &MemberProfile,
    roles: &[RoleConfig],
    now: DateTime<Utc>,
    mut grant: F,
) -> Vec<AssignmentOutcome>
where
    F: FnMut(Snowflake) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut outcomes = Vec::with_capacity(roles.len());

    for role in roles {
        let eligible = evaluate(profile, &role.conditions, now);
        let failure_reason = if eligible {
            grant(role.role_id.clone())
                .await
                .err()
                .map(|err| err.to_string())
        } else {
            None
        };

        debug!(
            role_id = %role.role_id,
            eligible,
            failed = failure_reason.is_some(),
            "auto-role evaluated"
        );

        outcomes.push(AssignmentOutcome {
            role_id: role.role_id.clone(),
            role_name: role.role_name.clone(),
            eligible,
            failure_reason,
        });
    }

    outcomes
}

/// Names of the roles that were granted, in order.
pub fn granted_names(outcomes: &[AssignmentOutcome]) -> Vec<&str> {
    outcomes
        .iter()
        .filter(|o| o.granted())
        .map(|o| o.role_name.as_str())
        .collect()
}

/// `Name (reason)` for every failed grant, in order.
pub fn failure_summary(outcomes: &[AssignmentOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|o| {
            o.failure_reason
                .as_ref()
                .map(|reason| format!("{} ({})", o.role_name, reason))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autorole::condition::{Condition, ConditionKind};
    use chrono::TimeZone;
    use futures_lite::future::block_on;
    use std::future::ready;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn cond(kind: ConditionKind, value: &str, op: Option<&str>) -> Condition {
        Condition::parse(kind, Some(value), op).unwrap()
    }

    // -- orchestration -------------------------------------------------------

    #[test]
    fn empty_role_list_yields_no_outcomes() {
        let now = at(2024, 1, 1);
        let profile = MemberProfile::new(now, "x");
        let outcomes = block_on(assign_eligible_roles(&profile, &[], now, |_| {
            ready(Ok::<(), String>(()))
        }));
        assert!(outcomes.is_empty());
    }

    #[test]
    fn failed_grant_does_not_stop_the_pass() {
        let now = at(2024, 1, 1);
        let profile = MemberProfile::new(at(2020, 1, 1), "x");
        let roles = vec![
            RoleConfig::new("1", "One"),
            RoleConfig::new("2", "Two"),
            RoleConfig::new("3", "Three"),
        ];

        let mut calls = Vec::new();
        let outcomes = block_on(assign_eligible_roles(&profile, &roles, now, |id| {
            calls.push(id.clone());
            ready(if id == "2" {
                Err("Missing Permissions".to_string())
            } else {
                Ok(())
            })
        }));

        assert_eq!(calls, ["1", "2", "3"]);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.eligible));
        assert_eq!(outcomes[0].failure_reason, None);
        assert_eq!(
            outcomes[1].failure_reason.as_deref(),
            Some("Missing Permissions")
        );
        assert_eq!(outcomes[2].failure_reason, None);
        assert_eq!(granted_names(&outcomes), ["One", "Three"]);
        assert_eq!(failure_summary(&outcomes), ["Two (Missing Permissions)"]);
    }

    #[test]
    fn ineligible_roles_are_not_granted() {
        let now = at(2024, 1, 1);
        let profile = MemberProfile::new(at(2023, 12, 31), "newbie");
        let roles =
            vec![RoleConfig::new("1", "Old").with_condition(cond(
                ConditionKind::AccountAge,
                "30",
                Some(">="),
            ))];

        let mut calls = 0;
        let outcomes = block_on(assign_eligible_roles(&profile, &roles, now, |_| {
            calls += 1;
            ready(Ok::<(), String>(()))
        }));

        assert_eq!(calls, 0);
        assert!(!outcomes[0].eligible);
        assert_eq!(outcomes[0].failure_reason, None);
        assert!(!outcomes[0].granted());
    }

    #[test]
    fn repeated_passes_produce_identical_outcomes() {
        let now = at(2024, 2, 15);
        let profile = MemberProfile::new(at(2023, 1, 15), "someone");
        let roles = vec![
            RoleConfig::new("1", "A").with_condition(cond(ConditionKind::AccountAge, "365", Some(">"))),
            RoleConfig::new("2", "B").with_condition(cond(ConditionKind::UsernameContains, "zzz", None)),
        ];
        let run = || {
            block_on(assign_eligible_roles(&profile, &roles, now, |_| {
                ready(Ok::<(), String>(()))
            }))
        };
        assert_eq!(run(), run());
    }

    // -- end to end ------------------------------------------------------------

    #[test]
    fn member_from_january_2023_joining_february_2024() {
        let created = at(2023, 1, 15);
        let now = at(2024, 2, 15);
        assert_eq!(crate::autorole::account_age_days(created, now), 396);

        let profile = MemberProfile::new(created, "member");
        let roles = vec![
            RoleConfig::new("a", "A").with_condition(cond(ConditionKind::AccountAge, "365", Some(">"))),
            RoleConfig::new("b", "B").with_condition(cond(ConditionKind::CreationYear, "2023", Some("="))),
            RoleConfig::new("c", "C").with_condition(cond(ConditionKind::CreationYear, "2024", Some(">="))),
        ];

        let mut granted = Vec::new();
        let outcomes = block_on(assign_eligible_roles(&profile, &roles, now, |id| {
            granted.push(id);
            ready(Ok::<(), String>(()))
        }));

        assert_eq!(granted, ["a", "b"]);
        let eligible: Vec<_> = outcomes.iter().map(|o| o.eligible).collect();
        assert_eq!(eligible, [true, true, false]);
    }
}
