use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::events::AssignmentEvent;
use crate::flags::VariationType;

/// Result of a flag evaluation that matched a split.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Value to return to the caller.
    pub value: AssignmentValue,
    /// Key of the matched allocation.
    pub allocation_key: String,
    /// Key of the assigned variation.
    pub variation_key: String,
    /// Event to deliver to the assignment logger, when the matched allocation has logging
    /// enabled.
    pub event: Option<AssignmentEvent>,
}

/// A typed variation value assigned to a subject.
///
/// Serializes as a two-field object, e.g. `{"type":"INTEGER","value":13}`.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Numeric(f64),
    /// A boolean value.
    Boolean(bool),
    /// An arbitrary JSON value.
    Json(serde_json::Value),
}

impl Serialize for AssignmentValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AssignmentValue", 2)?;
        match self {
            AssignmentValue::String(s) => {
                state.serialize_field("type", "STRING")?;
                state.serialize_field("value", s)?;
            }
            AssignmentValue::Integer(i) => {
                state.serialize_field("type", "INTEGER")?;
                state.serialize_field("value", i)?;
            }
            AssignmentValue::Numeric(n) => {
                state.serialize_field("type", "NUMERIC")?;
                state.serialize_field("value", n)?;
            }
            AssignmentValue::Boolean(b) => {
                state.serialize_field("type", "BOOLEAN")?;
                state.serialize_field("value", b)?;
            }
            AssignmentValue::Json(v) => {
                state.serialize_field("type", "JSON")?;
                state.serialize_field("value", v)?;
            }
        }
        state.end()
    }
}

impl AssignmentValue {
    /// Return the value as `&str` if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AssignmentValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract the string if the value is a string.
    pub fn into_string(self) -> Option<String> {
        match self {
            AssignmentValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Return the value as `i64` if it is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AssignmentValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Return the value as `f64` if it is numeric.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            AssignmentValue::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    /// Return the value as `bool` if it is a boolean.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AssignmentValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract the JSON value if the value is JSON.
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            AssignmentValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// The [`VariationType`] of this value.
    pub fn variation_type(&self) -> VariationType {
        match self {
            AssignmentValue::String(_) => VariationType::String,
            AssignmentValue::Integer(_) => VariationType::Integer,
            AssignmentValue::Numeric(_) => VariationType::Numeric,
            AssignmentValue::Boolean(_) => VariationType::Boolean,
            AssignmentValue::Json(_) => VariationType::Json,
        }
    }

    /// Lossless string form of the value: integer `13` renders as `"13"`, not `"13.0"`.
    pub fn to_display_string(&self) -> String {
        match self {
            AssignmentValue::String(s) => s.clone(),
            AssignmentValue::Integer(i) => i.to_string(),
            AssignmentValue::Numeric(n) => n.to_string(),
            AssignmentValue::Boolean(b) => b.to_string(),
            AssignmentValue::Json(v) => v.to_string(),
        }
    }
}

/// Machine-readable reason for an evaluation outcome, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationReason {
    /// An allocation matched and a variation was assigned.
    Match,
    /// No configuration is loaded (not fetched yet, or the client was shut down).
    ConfigurationMissing,
    /// The flag key is not present in the configuration.
    FlagUnrecognized,
    /// The flag exists but is disabled.
    FlagDisabled,
    /// No allocation's rules/window/splits matched the subject.
    NoMatch,
    /// The flag's variation type differs from the requested type.
    TypeMismatch,
    /// The configuration is internally inconsistent (e.g., a split references a missing
    /// variation, or the flag failed to parse).
    ConfigurationError,
}

/// Evaluation result plus the reason and matched keys, for the `*_details` client calls.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDetails<T> {
    /// Assigned value, or the caller-supplied default on any fallback.
    pub value: T,
    /// Why this value was chosen.
    pub reason: EvaluationReason,
    /// Key of the matched allocation, if any.
    pub allocation_key: Option<String>,
    /// Key of the matched variation, if any.
    pub variation_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::AssignmentValue;

    #[test]
    fn display_string_preserves_numeric_formatting() {
        assert_eq!(AssignmentValue::Integer(13).to_display_string(), "13");
        assert_eq!(AssignmentValue::Numeric(2.5).to_display_string(), "2.5");
        assert_eq!(AssignmentValue::Numeric(13.0).to_display_string(), "13");
        assert_eq!(AssignmentValue::Boolean(true).to_display_string(), "true");
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_string(&AssignmentValue::Integer(13)).unwrap();
        assert_eq!(json, r#"{"type":"INTEGER","value":13}"#);
    }
}
