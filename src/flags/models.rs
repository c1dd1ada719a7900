use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::assignment::AssignmentValue;

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The flags configuration document as served over the wire.
///
/// `flags` must be a JSON object keyed by flag key; an array is rejected at parse time.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlagsConfig {
    /// When the configuration document was generated by the server.
    pub created_at: Timestamp,
    /// Which audience the document was compiled for. Unknown values parse as
    /// [`ConfigFormat::Undefined`].
    #[serde(default)]
    pub format: ConfigFormat,
    /// Environment the document belongs to.
    pub environment: Environment,
    /// Flag configurations.
    ///
    /// Values are wrapped in [`TryParse`] so a single flag in an unrecognized format does not
    /// make the rest of the document unusable.
    pub flags: HashMap<String, TryParse<Flag>>,
    /// Associations between string flag variations and bandits. The bandit models themselves are
    /// served as a separate document.
    #[serde(default)]
    pub bandits: HashMap<String, Vec<BanditVariation>>,
}

/// Format of a configuration document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigFormat {
    Client,
    Server,
    #[default]
    #[serde(other)]
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Name of the environment.
    pub name: String,
}

/// `TryParse` lets a subfield fail parsing without failing the whole structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed; the unrecognized value is kept for round-tripping.
    ParseFailed(serde_json::Value),
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Flag {
    pub key: String,
    pub enabled: bool,
    pub variation_type: VariationType,
    pub variations: HashMap<String, Variation>,
    pub allocations: Vec<Allocation>,
    #[serde(default = "default_total_shards")]
    pub total_shards: u64,
}

fn default_total_shards() -> u64 {
    10_000
}

/// Type of a flag's variations.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum VariationType {
    String,
    Integer,
    Numeric,
    Boolean,
    Json,
}

/// An untyped variation value from the wire.
///
/// Unlike [`AssignmentValue`], `Value` is untagged; the exact type is only known once combined
/// with the flag-level [`VariationType`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(untagged)]
pub enum Value {
    /// Maps to [`AssignmentValue::Boolean`].
    Boolean(bool),
    /// Maps to [`AssignmentValue::Integer`] or [`AssignmentValue::Numeric`].
    Number(f64),
    /// Maps to [`AssignmentValue::String`] or, parsed, to [`AssignmentValue::Json`].
    String(String),
}

impl Value {
    /// Try to interpret this value under the given [`VariationType`].
    pub(crate) fn to_assignment_value(&self, ty: VariationType) -> Option<AssignmentValue> {
        Some(match ty {
            VariationType::String => AssignmentValue::String(self.as_string()?.to_owned()),
            VariationType::Integer => AssignmentValue::Integer(self.as_integer()?),
            VariationType::Numeric => AssignmentValue::Numeric(self.as_number()?),
            VariationType::Boolean => AssignmentValue::Boolean(self.as_boolean()?),
            VariationType::Json => AssignmentValue::Json(self.to_json()?),
        })
    }

    fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        let f = self.as_number()?;
        let i = f as i64;
        (i as f64 == f).then_some(i)
    }

    fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(self.as_string()?).ok()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Variation {
    pub key: String,
    pub value: Value,
}

/// An ordered, conditionally-active bucket of traffic splits within a flag.
///
/// Allocations are evaluated in declared order; the first whose rules match and whose active
/// window contains "now" wins.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Allocation {
    pub key: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub start_at: Option<Timestamp>,
    #[serde(default)]
    pub end_at: Option<Timestamp>,
    pub splits: Vec<Split>,
    #[serde(default = "default_do_log")]
    pub do_log: bool,
}

fn default_do_log() -> bool {
    true
}

/// A rule is a conjunction of conditions: all must hold for the rule to match.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Rule {
    pub conditions: Vec<Condition>,
}

/// A check that a subject `attribute` relates to the condition `value` under `operator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub attribute: String,
    pub value: ConditionValue,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    /// Regex match. Condition value must be a regex string. Non-anchored, case-sensitive.
    Matches,
    /// Negated regex match.
    NotMatches,
    /// Greater than or equal. Sides must be numbers or semver strings.
    Gte,
    /// Greater than. Sides must be numbers or semver strings.
    Gt,
    /// Less than or equal. Sides must be numbers or semver strings.
    Lte,
    /// Less than. Sides must be numbers or semver strings.
    Lt,
    /// Membership in a list of strings. Case-sensitive.
    OneOf,
    /// Non-membership in a list of strings. Case-sensitive.
    ///
    /// A missing/null attribute fails this condition (i.e., `null NOT_ONE_OF ["x"]` is false).
    NotOneOf,
    /// Null check. Condition value must be a boolean: `true` checks for null/absent, `false`
    /// checks for present.
    IsNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum ConditionValue {
    Single(Value),
    /// The wire format only carries string lists.
    Multiple(Vec<String>),
}

impl<T: Into<Value>> From<T> for ConditionValue {
    fn from(value: T) -> Self {
        Self::Single(value.into())
    }
}
impl From<Vec<String>> for ConditionValue {
    fn from(value: Vec<String>) -> Self {
        Self::Multiple(value)
    }
}

/// A shard-range-to-variation mapping within an allocation.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Split {
    pub shards: Vec<Shard>,
    pub variation_key: String,
    #[serde(default)]
    pub extra_logging: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Shard {
    pub salt: String,
    pub ranges: Vec<ShardRange>,
}

/// Half-open bucket range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ShardRange {
    pub start: u64,
    pub end: u64,
}
impl ShardRange {
    pub(crate) fn contains(&self, v: u64) -> bool {
        self.start <= v && v < self.end
    }
}

/// Associates a variation of a string flag with a bandit.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditVariation {
    /// Key of the bandit.
    pub key: String,
    /// Key of the flag the bandit is attached to.
    pub flag_key: String,
    /// Key of the variation within the flag.
    pub variation_key: String,
    /// String value of the variation.
    pub variation_value: String,
}

#[cfg(test)]
mod tests {
    use super::{ConfigFormat, FlagsConfig, TryParse};

    #[test]
    fn one_bad_flag_does_not_poison_the_document() {
        let config: FlagsConfig = serde_json::from_str(
            r#"
              {
                "createdAt": "2024-07-18T00:00:00Z",
                "environment": {"name": "test"},
                "flags": {
                  "good": {
                    "key": "good",
                    "enabled": true,
                    "variationType": "BOOLEAN",
                    "variations": {},
                    "allocations": [],
                    "totalShards": 10000
                  },
                  "bad": {
                    "key": "bad",
                    "enabled": true,
                    "variationType": "SOME_FUTURE_TYPE",
                    "variations": {},
                    "allocations": [],
                    "totalShards": 10000
                  }
                }
              }
            "#,
        )
        .unwrap();
        assert!(matches!(config.flags["good"], TryParse::Parsed(_)));
        assert!(matches!(config.flags["bad"], TryParse::ParseFailed(_)));
    }

    #[test]
    fn flags_array_is_rejected() {
        let result = serde_json::from_str::<FlagsConfig>(
            r#"{"createdAt": "2024-07-18T00:00:00Z", "environment": {"name": "test"}, "flags": []}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_format_defaults_to_undefined() {
        let config: FlagsConfig = serde_json::from_str(
            r#"{"createdAt": "2024-07-18T00:00:00Z", "format": "EDGE", "environment": {"name": "test"}, "flags": {}}"#,
        )
        .unwrap();
        assert_eq!(config.format, ConfigFormat::Undefined);

        let config: FlagsConfig = serde_json::from_str(
            r#"{"createdAt": "2024-07-18T00:00:00Z", "format": "CLIENT", "environment": {"name": "test"}, "flags": {}}"#,
        )
        .unwrap();
        assert_eq!(config.format, ConfigFormat::Client);
    }
}
