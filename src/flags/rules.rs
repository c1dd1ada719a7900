use regex::Regex;
use semver::Version;

use crate::{
    flags::{Condition, ConditionOperator, ConditionValue, Rule, Value},
    AttributeValue, Attributes,
};

impl Rule {
    pub(crate) fn eval(&self, attributes: &Attributes) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.eval(attributes))
    }
}

impl Condition {
    fn eval(&self, attributes: &Attributes) -> bool {
        self.operator
            .eval(attributes.get(&self.attribute), &self.value)
    }
}

impl ConditionOperator {
    /// Apply the operator. Misconfiguration (wrong value shape, malformed regex) and missing
    /// attributes make the condition false rather than aborting evaluation.
    pub(crate) fn eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
    ) -> bool {
        self.try_eval(attribute, condition_value).unwrap_or(false)
    }

    /// Apply the operator, returning `None` when it cannot be applied to the given values.
    fn try_eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
    ) -> Option<bool> {
        match self {
            Self::Matches | Self::NotMatches => {
                let value = attribute?.as_str()?;
                let ConditionValue::Single(Value::String(pattern)) = condition_value else {
                    return None;
                };
                let matched = Regex::new(pattern).ok()?.is_match(value);
                Some(if matches!(self, Self::Matches) {
                    matched
                } else {
                    !matched
                })
            }

            Self::OneOf | Self::NotOneOf => {
                let value = attribute?.to_canonical_string()?;
                let ConditionValue::Multiple(candidates) = condition_value else {
                    return None;
                };
                let is_member = candidates.iter().any(|candidate| candidate == &value);
                Some(is_member == matches!(self, Self::OneOf))
            }

            Self::IsNull => {
                let is_null = attribute.is_none() || attribute == Some(&AttributeValue::Null);
                let ConditionValue::Single(Value::Boolean(expected_null)) = condition_value else {
                    return None;
                };
                Some(is_null == *expected_null)
            }

            Self::Gte | Self::Gt | Self::Lte | Self::Lt => {
                // Semver comparison applies when the condition value parses as semver; the
                // attribute must then be semver too. Otherwise both sides are compared as numbers.
                let condition_version = match condition_value {
                    ConditionValue::Single(Value::String(s)) => Version::parse(s).ok(),
                    _ => None,
                };

                if let Some(condition_version) = condition_version {
                    let attribute_version = Version::parse(attribute?.as_str()?).ok()?;
                    Some(match self {
                        Self::Gt => attribute_version > condition_version,
                        Self::Gte => attribute_version >= condition_version,
                        Self::Lt => attribute_version < condition_version,
                        Self::Lte => attribute_version <= condition_version,
                        _ => return None,
                    })
                } else {
                    let condition_number = match condition_value {
                        ConditionValue::Single(Value::Number(n)) => *n,
                        ConditionValue::Single(Value::String(s)) => s.parse().ok()?,
                        _ => return None,
                    };
                    let attribute_number = match attribute? {
                        AttributeValue::Number(n) => *n,
                        AttributeValue::String(s) => s.parse().ok()?,
                        _ => return None,
                    };
                    Some(match self {
                        Self::Gt => attribute_number > condition_number,
                        Self::Gte => attribute_number >= condition_number,
                        Self::Lt => attribute_number < condition_number,
                        Self::Lte => attribute_number <= condition_number,
                        _ => return None,
                    })
                }
            }
        }
    }
}
