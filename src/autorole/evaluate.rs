//! Pure eligibility check for a single member against a condition set.

use chrono::{DateTime, Datelike, Utc};

use super::condition::Condition;
use crate::types::User;

const MS_PER_DAY: i64 = 86_400_000;

/// The parts of a member that conditions look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub account_created_at: DateTime<Utc>,
    pub username: String,
}

impl MemberProfile {
    pub fn new(account_created_at: DateTime<Utc>, username: impl Into<String>) -> Self {
        Self {
            account_created_at,
            username: username.into(),
        }
    }

    /// Build a profile from a gateway user. `None` if the id is not a
    /// valid snowflake.
    pub fn from_user(user: &User) -> Option<Self> {
        Some(Self {
            account_created_at: user.created_at()?,
            username: user.username.clone(),
        })
    }
}

/// Whole days elapsed from `created` to `now`, rounded toward negative
/// infinity.
pub fn account_age_days(created: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created).num_milliseconds().div_euclid(MS_PER_DAY)
}

/// `true` when every condition holds. An empty slice is satisfied.
pub fn evaluate(profile: &MemberProfile, conditions: &[Condition], now: DateTime<Utc>) -> bool {
    conditions
        .iter()
        .all(|condition| holds(profile, condition, now))
}

#[allow(clippy::cast_precision_loss)]
fn holds(profile: &MemberProfile, condition: &Condition, now: DateTime<Utc>) -> bool {
    let created = profile.account_created_at;
    match condition {
        Condition::AccountAge { operator, days } => {
            days.is_finite()
                && operator.compare(account_age_days(created, now) as f64, *days)
        }
        Condition::CreationMonth { month } => created.month() == *month,
        Condition::CreationYear { operator, year } => {
            year.is_finite() && operator.compare(f64::from(created.year()), *year)
        }
        Condition::UsernameContains { needle } => {
            profile.username.to_lowercase().contains(needle.as_str())
        }
        Condition::UsernameRegex { pattern } => pattern.is_match(&profile.username),
        Condition::Unknown { .. } => true,
        Condition::Invalid { .. } => false,
    }
}
