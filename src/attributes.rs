use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Generic subject attributes: attribute name to value.
///
/// # Examples
/// ```
/// # use switchyard::{Attributes, AttributeValue};
/// let attributes = [
///     ("age".to_owned(), 30.0.into()),
///     ("country".to_owned(), "UK".into()),
///     ("is_returning".to_owned(), true.into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, AttributeValue>;

/// A single attribute value.
///
/// Only scalar values are representable. Nested arrays and objects are not valid attributes and
/// are rejected when classifying untrusted input (see [`attributes_from_json`]).
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    #[from]
    String(String),
    /// A numeric value.
    #[from]
    Number(f64),
    /// A boolean value.
    #[from]
    Boolean(bool),
    /// A null value or absence of value.
    Null,
}

impl AttributeValue {
    /// Return the value as `&str` if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Canonical string form used for categorical matching. Numbers and booleans are
    /// stringified, so `42.0` matches the condition value `"42"`.
    pub(crate) fn to_canonical_string(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Number(n) => Some(n.to_string()),
            AttributeValue::Boolean(b) => Some(b.to_string()),
            AttributeValue::Null => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

/// Classify a JSON object into [`Attributes`], rejecting nested shapes.
///
/// Numbers, strings, booleans, and null map to the corresponding [`AttributeValue`]. Arrays and
/// objects fail with [`Error::InvalidAttribute`] naming the offending key, so malformed input is
/// caught at construction rather than surfacing as surprising rule mismatches later.
pub fn attributes_from_json(
    object: serde_json::Map<String, serde_json::Value>,
) -> Result<Attributes> {
    object
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::Null => AttributeValue::Null,
                serde_json::Value::Bool(b) => AttributeValue::Boolean(b),
                serde_json::Value::Number(n) => {
                    AttributeValue::Number(n.as_f64().ok_or_else(|| Error::InvalidAttribute {
                        key: key.clone(),
                    })?)
                }
                serde_json::Value::String(s) => AttributeValue::String(s),
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                    return Err(Error::InvalidAttribute { key });
                }
            };
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{attributes_from_json, AttributeValue};
    use crate::Error;

    #[test]
    fn classifies_scalars() {
        let serde_json::Value::Object(object) = json!({
            "age": 30,
            "country": "UK",
            "returning": true,
            "unset": null,
        }) else {
            unreachable!()
        };

        let attributes = attributes_from_json(object).unwrap();
        assert_eq!(attributes["age"], AttributeValue::Number(30.0));
        assert_eq!(attributes["country"], AttributeValue::String("UK".to_owned()));
        assert_eq!(attributes["returning"], AttributeValue::Boolean(true));
        assert_eq!(attributes["unset"], AttributeValue::Null);
    }

    #[test]
    fn rejects_nested_values() {
        let serde_json::Value::Object(object) = json!({"tags": ["a", "b"]}) else {
            unreachable!()
        };
        let err = attributes_from_json(object).unwrap_err();
        assert!(matches!(err, Error::InvalidAttribute { key } if key == "tags"));
    }
}
