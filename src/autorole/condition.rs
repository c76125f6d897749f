//! Typed auto-role conditions.
//!
//! A condition arrives as three strings (kind, value, operator). It is turned
//! into a [`Condition`] exactly once: strictly through [`Condition::parse`]
//! when an admin authors it, or leniently through [`Condition::load`] when a
//! stored blob is read back. Evaluation never sees raw strings.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the compiled size of an admin-supplied pattern.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The predicates a role can be gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    AccountAge,
    CreationMonth,
    CreationYear,
    UsernameContains,
    UsernameRegex,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 5] = [
        ConditionKind::AccountAge,
        ConditionKind::CreationMonth,
        ConditionKind::CreationYear,
        ConditionKind::UsernameContains,
        ConditionKind::UsernameRegex,
    ];

    /// The key used in storage and in slash-command choices.
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionKind::AccountAge => "account_age",
            ConditionKind::CreationMonth => "creation_month",
            ConditionKind::CreationYear => "creation_year",
            ConditionKind::UsernameContains => "username_contains",
            ConditionKind::UsernameRegex => "username_regex",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ConditionKind::AccountAge => "Account Age",
            ConditionKind::CreationMonth => "Account Creation Month",
            ConditionKind::CreationYear => "Account Creation Year",
            ConditionKind::UsernameContains => "Username Contains",
            ConditionKind::UsernameRegex => "Username Regular Expression",
        }
    }

    /// Whether the kind compares numbers and therefore consults an operator.
    pub fn is_numeric(self) -> bool {
        matches!(self, ConditionKind::AccountAge | ConditionKind::CreationYear)
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionKind {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConditionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConditionError::UnknownKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Comparison applied by numeric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl Operator {
    pub const ALL: [Operator; 5] = [
        Operator::Greater,
        Operator::Less,
        Operator::Equal,
        Operator::GreaterOrEqual,
        Operator::LessOrEqual,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::Equal => "=",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
        }
    }

    /// English phrase used when describing a condition to admins.
    pub fn phrase(self) -> &'static str {
        match self {
            Operator::Greater => "greater than",
            Operator::Less => "less than",
            Operator::Equal => "equal to",
            Operator::GreaterOrEqual => "greater than or equal to",
            Operator::LessOrEqual => "less than or equal to",
        }
    }

    /// `actual <op> threshold`. Equality is exact.
    #[allow(clippy::float_cmp)]
    pub fn compare(self, actual: f64, threshold: f64) -> bool {
        match self {
            Operator::Greater => actual > threshold,
            Operator::Less => actual < threshold,
            Operator::Equal => actual == threshold,
            Operator::GreaterOrEqual => actual >= threshold,
            Operator::LessOrEqual => actual <= threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.symbol() == s.trim())
            .ok_or_else(|| ConditionError::UnknownOperator(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an authored condition was rejected.
///
/// The messages are shown verbatim to the admin who issued the command.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("unknown condition type `{0}`")]
    UnknownKind(String),

    #[error("a condition value is required for this condition type")]
    MissingValue,

    #[error("an operator is required for numeric conditions")]
    MissingOperator,

    #[error("unknown operator `{0}`; use one of >, <, =, >=, <=")]
    UnknownOperator(String),

    #[error("the condition value must be a number for {kind} (got `{value}`)")]
    NotANumber { kind: ConditionKind, value: String },

    #[error("the month must be a whole number from 1 to 12 (got `{0}`)")]
    MonthOutOfRange(String),

    #[error("invalid regular expression `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// One predicate attached to an auto-role, with its payload already typed.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Whole days since account creation compared against `days`.
    AccountAge { operator: Operator, days: f64 },
    /// UTC calendar month of account creation must equal `month` (1-12).
    CreationMonth { month: u32 },
    /// UTC calendar year of account creation compared against `year`.
    CreationYear { operator: Operator, year: f64 },
    /// Case-insensitive substring; `needle` is stored lowercased.
    UsernameContains { needle: String },
    /// Case-sensitive regex test against the username.
    UsernameRegex { pattern: Regex },
    /// A kind this build does not know. Always satisfied.
    Unknown { kind: String },
    /// A stored condition that could not be loaded. Never satisfied.
    Invalid { kind: ConditionKind, reason: String },
}

impl Condition {
    /// Validate an admin-authored condition.
    ///
    /// Numeric kinds require an operator and a finite number; the month
    /// must be an integer 1-12; a regex must compile. The operator is
    /// ignored for the structural kinds. Username values are taken as
    /// given, surrounding whitespace included.
    pub fn parse(
        kind: ConditionKind,
        value: Option<&str>,
        operator: Option<&str>,
    ) -> Result<Self, ConditionError> {
        let value = value
            .filter(|v| !v.is_empty())
            .ok_or(ConditionError::MissingValue)?;

        match kind {
            ConditionKind::AccountAge | ConditionKind::CreationYear => {
                let operator: Operator = operator
                    .filter(|op| !op.trim().is_empty())
                    .ok_or(ConditionError::MissingOperator)?
                    .parse()?;
                let threshold = parse_finite(value).ok_or_else(|| ConditionError::NotANumber {
                    kind,
                    value: value.to_string(),
                })?;
                Ok(numeric(kind, operator, threshold))
            }
            ConditionKind::CreationMonth => {
                let month = parse_month(value)
                    .ok_or_else(|| ConditionError::MonthOutOfRange(value.to_string()))?;
                Ok(Condition::CreationMonth { month })
            }
            ConditionKind::UsernameContains => Ok(Condition::UsernameContains {
                needle: value.to_lowercase(),
            }),
            ConditionKind::UsernameRegex => {
                let pattern = compile_pattern(value).map_err(|source| {
                    ConditionError::InvalidRegex {
                        pattern: value.to_string(),
                        source,
                    }
                })?;
                Ok(Condition::UsernameRegex { pattern })
            }
        }
    }

    /// Rebuild a condition from storage. Never fails.
    ///
    /// Unknown kinds load as [`Condition::Unknown`]; anything that would
    /// have been rejected by [`Condition::parse`] loads as
    /// [`Condition::Invalid`] so evaluation fails closed on it. A missing
    /// operator on a numeric kind defaults to `=`; an unrecognised one is
    /// invalid rather than read as `=`.
    pub fn load(kind: &str, spec: &ConditionSpec) -> Self {
        let Ok(known) = kind.parse::<ConditionKind>() else {
            return Condition::Unknown {
                kind: kind.to_string(),
            };
        };

        let operator = spec
            .operator
            .as_deref()
            .filter(|op| !op.trim().is_empty())
            .unwrap_or("=");
        let operator = known.is_numeric().then_some(operator);

        Condition::parse(known, Some(&spec.value), operator).unwrap_or_else(|err| {
            Condition::Invalid {
                kind: known,
                reason: err.to_string(),
            }
        })
    }

    /// Storage key of this condition; kinds are unique per role.
    pub fn kind_name(&self) -> &str {
        match self {
            Condition::AccountAge { .. } => ConditionKind::AccountAge.as_str(),
            Condition::CreationMonth { .. } => ConditionKind::CreationMonth.as_str(),
            Condition::CreationYear { .. } => ConditionKind::CreationYear.as_str(),
            Condition::UsernameContains { .. } => ConditionKind::UsernameContains.as_str(),
            Condition::UsernameRegex { .. } => ConditionKind::UsernameRegex.as_str(),
            Condition::Unknown { kind } => kind,
            Condition::Invalid { kind, .. } => kind.as_str(),
        }
    }
}

fn numeric(kind: ConditionKind, operator: Operator, threshold: f64) -> Condition {
    match kind {
        ConditionKind::CreationYear => Condition::CreationYear {
            operator,
            year: threshold,
        },
        _ => Condition::AccountAge {
            operator,
            days: threshold,
        },
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_month(raw: &str) -> Option<u32> {
    let n = parse_finite(raw)?;
    (n.fract() == 0.0 && (1.0..=12.0).contains(&n)).then_some(n as u32)
}

fn compile_pattern(raw: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(raw).size_limit(REGEX_SIZE_LIMIT).build()
}

// ---------------------------------------------------------------------------
// Stored form
// ---------------------------------------------------------------------------

/// A condition as persisted inside the auto-role JSON blob.
///
/// Decoding never fails: numbers and booleans are read as their text, a
/// missing or null `value` reads as empty, and a bare scalar in place of
/// the object is taken as the value. Whatever does not validate later
/// loads as [`Condition::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct ConditionSpec {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

impl From<serde_json::Value> for ConditionSpec {
    fn from(raw: serde_json::Value) -> Self {
        match raw {
            serde_json::Value::Object(map) => Self {
                value: map.get("value").map(scalar_text).unwrap_or_default(),
                operator: map
                    .get("operator")
                    .filter(|op| !op.is_null())
                    .map(scalar_text),
            },
            other => Self {
                value: scalar_text(&other),
                operator: None,
            },
        }
    }
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl ConditionSpec {
    /// Stored form of a condition that passed [`Condition::parse`].
    ///
    /// Structural kinds record `=`, which is never consulted.
    pub fn new(value: impl Into<String>, operator: Option<Operator>) -> Self {
        Self {
            value: value.into(),
            operator: Some(operator.unwrap_or(Operator::Equal).symbol().to_string()),
        }
    }
}

/// Human-readable description of a stored condition.
pub fn describe(kind: &str, spec: &ConditionSpec) -> String {
    let operator = spec.operator.as_deref().unwrap_or("=");
    let phrase = operator
        .parse::<Operator>()
        .map(Operator::phrase)
        .unwrap_or(operator);

    match kind.parse::<ConditionKind>() {
        Ok(ConditionKind::AccountAge) => {
            format!("Account must be {} {} days old", phrase, spec.value)
        }
        Ok(ConditionKind::CreationMonth) => format!(
            "Account must be created in month: {}",
            parse_month(&spec.value)
                .and_then(month_name)
                .unwrap_or(spec.value.as_str())
        ),
        Ok(ConditionKind::CreationYear) => {
            format!("Account creation year must be {} {}", phrase, spec.value)
        }
        Ok(ConditionKind::UsernameContains) => {
            format!("Username must contain: \"{}\"", spec.value)
        }
        Ok(ConditionKind::UsernameRegex) => {
            format!("Username must match regex: {}", spec.value)
        }
        Err(_) => format!("{}: {}", kind, spec.value),
    }
}

/// Display name for a stored kind, falling back to the raw key.
pub fn kind_display_name(kind: &str) -> &str {
    kind.parse::<ConditionKind>()
        .map(ConditionKind::display_name)
        .unwrap_or(kind)
}

pub fn month_name(month: u32) -> Option<&'static str> {
    const MONTHS: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    let index = usize::try_from(month.checked_sub(1)?).ok()?;
    MONTHS.get(index).copied()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_tokens, Token};

    fn spec(value: &str, operator: Option<&str>) -> ConditionSpec {
        ConditionSpec {
            value: value.to_string(),
            operator: operator.map(str::to_string),
        }
    }

    // -- kinds and operators -------------------------------------------------

    #[test]
    fn kinds_round_trip_through_their_keys() {
        for kind in ConditionKind::ALL {
            assert_eq!(kind.as_str().parse::<ConditionKind>().unwrap(), kind);
        }
        assert!(matches!(
            "clear".parse::<ConditionKind>(),
            Err(ConditionError::UnknownKind(_))
        ));
    }

    #[test]
    fn operator_serializes_as_symbol() {
        assert_tokens(
            &Operator::GreaterOrEqual,
            &[Token::UnitVariant {
                name: "Operator",
                variant: ">=",
            }],
        );
    }

    #[test]
    fn operator_compare_is_exact() {
        assert!(Operator::Equal.compare(30.0, 30.0));
        assert!(!Operator::Equal.compare(30.0, 30.000_001));
        assert!(Operator::GreaterOrEqual.compare(30.0, 30.0));
        assert!(!Operator::Greater.compare(30.0, 30.0));
        assert!(Operator::LessOrEqual.compare(29.0, 30.0));
        assert!(Operator::Less.compare(29.0, 30.0));
    }

    // -- parse (authoring) ---------------------------------------------------

    #[test]
    fn parse_requires_a_value() {
        let err = Condition::parse(ConditionKind::UsernameContains, None, None).unwrap_err();
        assert!(matches!(err, ConditionError::MissingValue));
        let err = Condition::parse(ConditionKind::UsernameContains, Some(""), None).unwrap_err();
        assert!(matches!(err, ConditionError::MissingValue));
        let err = Condition::parse(ConditionKind::AccountAge, Some("  "), Some(">")).unwrap_err();
        assert!(matches!(err, ConditionError::NotANumber { .. }));
    }

    #[test]
    fn parse_keeps_username_whitespace() {
        let cond = Condition::parse(ConditionKind::UsernameContains, Some(" Mod"), None).unwrap();
        assert!(matches!(cond, Condition::UsernameContains { ref needle } if needle == " mod"));

        let cond = Condition::parse(ConditionKind::AccountAge, Some(" 30 "), Some(">")).unwrap();
        assert!(matches!(cond, Condition::AccountAge { days, .. } if days == 30.0));
    }

    #[test]
    fn parse_numeric_requires_operator_and_number() {
        let err = Condition::parse(ConditionKind::AccountAge, Some("30"), None).unwrap_err();
        assert!(matches!(err, ConditionError::MissingOperator));

        let err = Condition::parse(ConditionKind::AccountAge, Some("thirty"), Some(">=")).unwrap_err();
        assert!(matches!(err, ConditionError::NotANumber { .. }));

        let err = Condition::parse(ConditionKind::CreationYear, Some("inf"), Some(">")).unwrap_err();
        assert!(matches!(err, ConditionError::NotANumber { .. }));

        let err = Condition::parse(ConditionKind::CreationYear, Some("2020"), Some("!=")).unwrap_err();
        assert!(matches!(err, ConditionError::UnknownOperator(_)));
    }

    #[test]
    fn parse_numeric_builds_typed_payload() {
        let cond = Condition::parse(ConditionKind::AccountAge, Some(" 30 "), Some(">=")).unwrap();
        assert!(matches!(
            cond,
            Condition::AccountAge { operator: Operator::GreaterOrEqual, days } if days == 30.0
        ));

        let cond = Condition::parse(ConditionKind::CreationYear, Some("2023"), Some("=")).unwrap();
        assert!(matches!(
            cond,
            Condition::CreationYear { operator: Operator::Equal, year } if year == 2023.0
        ));
    }

    #[test]
    fn parse_month_checks_range() {
        assert!(matches!(
            Condition::parse(ConditionKind::CreationMonth, Some("6"), None).unwrap(),
            Condition::CreationMonth { month: 6 }
        ));
        for bad in ["0", "13", "6.5", "june"] {
            let err = Condition::parse(ConditionKind::CreationMonth, Some(bad), None).unwrap_err();
            assert!(matches!(err, ConditionError::MonthOutOfRange(_)), "{bad}");
        }
    }

    #[test]
    fn parse_month_ignores_operator() {
        let cond = Condition::parse(ConditionKind::CreationMonth, Some("2"), Some("nonsense")).unwrap();
        assert!(matches!(cond, Condition::CreationMonth { month: 2 }));
    }

    #[test]
    fn parse_contains_lowercases_needle() {
        let cond = Condition::parse(ConditionKind::UsernameContains, Some("VIP"), None).unwrap();
        assert!(matches!(cond, Condition::UsernameContains { ref needle } if needle == "vip"));
    }

    #[test]
    fn parse_rejects_bad_regex() {
        let err = Condition::parse(ConditionKind::UsernameRegex, Some("[a-z"), None).unwrap_err();
        assert!(matches!(err, ConditionError::InvalidRegex { .. }));
        assert!(err.to_string().contains("[a-z"));
    }

    // -- load (storage) ------------------------------------------------------

    #[test]
    fn load_unknown_kind_is_preserved() {
        let cond = Condition::load("has_avatar", &spec("true", None));
        assert!(matches!(cond, Condition::Unknown { ref kind } if kind == "has_avatar"));
        assert_eq!(cond.kind_name(), "has_avatar");
    }

    #[test]
    fn load_malformed_value_becomes_invalid() {
        let cond = Condition::load("account_age", &spec("soon", Some(">")));
        assert!(matches!(
            cond,
            Condition::Invalid { kind: ConditionKind::AccountAge, .. }
        ));

        let cond = Condition::load("username_regex", &spec("(unclosed", None));
        assert!(matches!(
            cond,
            Condition::Invalid { kind: ConditionKind::UsernameRegex, .. }
        ));
    }

    #[test]
    fn load_defaults_missing_operator_to_equality() {
        let cond = Condition::load("creation_year", &spec("2023", None));
        assert!(matches!(
            cond,
            Condition::CreationYear { operator: Operator::Equal, .. }
        ));
    }

    #[test]
    fn load_unrecognised_operator_fails_closed() {
        let cond = Condition::load("creation_year", &spec("2023", Some("~")));
        assert!(matches!(cond, Condition::Invalid { .. }));

        // "==" is not read as "=": the role is withheld even for a 2023 account.
        let cond = Condition::load("creation_year", &spec("2023", Some("==")));
        assert!(matches!(
            cond,
            Condition::Invalid { kind: ConditionKind::CreationYear, .. }
        ));
        let created = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2023, 5, 1, 0, 0, 0).unwrap();
        let profile = crate::autorole::MemberProfile::new(created, "newbie");
        assert!(!crate::autorole::evaluate(&profile, &[cond], created));
    }

    // -- stored form and descriptions -----------------------------------------

    #[test]
    fn spec_decodes_loosely_typed_values() {
        let decoded: ConditionSpec =
            serde_json::from_value(serde_json::json!({ "value": 30, "operator": ">" })).unwrap();
        assert_eq!(decoded, spec("30", Some(">")));
        assert!(matches!(
            Condition::load("account_age", &decoded),
            Condition::AccountAge { operator: Operator::Greater, days } if days == 30.0
        ));

        let decoded: ConditionSpec =
            serde_json::from_value(serde_json::json!({ "operator": null })).unwrap();
        assert_eq!(decoded, spec("", None));
        assert!(matches!(
            Condition::load("username_contains", &decoded),
            Condition::Invalid { .. }
        ));

        let decoded: ConditionSpec = serde_json::from_value(serde_json::json!(6)).unwrap();
        assert_eq!(decoded, spec("6", None));

        let decoded: ConditionSpec =
            serde_json::from_value(serde_json::json!({ "value": [1, 2] })).unwrap();
        assert!(matches!(
            Condition::load("creation_year", &decoded),
            Condition::Invalid { .. }
        ));
    }


    #[test]
    fn spec_records_default_operator() {
        assert_eq!(ConditionSpec::new("mod", None).operator.as_deref(), Some("="));
        assert_eq!(
            ConditionSpec::new("30", Some(Operator::Greater)).operator.as_deref(),
            Some(">")
        );
    }

    #[test]
    fn describe_matches_admin_wording() {
        assert_eq!(
            describe("account_age", &spec("30", Some(">="))),
            "Account must be greater than or equal to 30 days old"
        );
        assert_eq!(
            describe("creation_month", &spec("6", Some("="))),
            "Account must be created in month: June"
        );
        assert_eq!(
            describe("creation_year", &spec("2023", Some("<"))),
            "Account creation year must be less than 2023"
        );
        assert_eq!(
            describe("username_contains", &spec("vip", None)),
            "Username must contain: \"vip\""
        );
        assert_eq!(
            describe("username_regex", &spec("^a", None)),
            "Username must match regex: ^a"
        );
        assert_eq!(describe("mystery", &spec("x", None)), "mystery: x");
    }

    #[test]
    fn month_names_cover_calendar() {
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
    }

    #[test]
    fn display_names_fall_back_to_key() {
        assert_eq!(kind_display_name("account_age"), "Account Age");
        assert_eq!(kind_display_name("mystery"), "mystery");
    }
}
