use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{AttributeValue, Attributes};

/// A categorical attribute.
///
/// The original value is preserved for equality and logging, but it is matched and scored by its
/// canonical string form (booleans as `"true"`/`"false"`, numbers in decimal notation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoricalAttribute(AttributeValue);

impl CategoricalAttribute {
    /// Canonical string form used for coefficient lookup and condition matching.
    pub(crate) fn to_canonical_string(&self) -> Option<String> {
        self.0.to_canonical_string()
    }
}

impl From<CategoricalAttribute> for AttributeValue {
    fn from(value: CategoricalAttribute) -> AttributeValue {
        value.0
    }
}

/// Subject or action attributes split by their semantics.
///
/// Numeric attributes are quantitative (real numbers) and define a scale. Categorical attributes
/// have a finite set of values that are not directly comparable (an enumeration). A number used
/// to represent on/off values or an enumeration is a categorical attribute, which is why the two
/// buckets are kept separate instead of being inferred at evaluation time.
///
/// The container is immutable after construction. Accessors return copies, so callers cannot
/// mutate engine-owned state through them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAttributes {
    #[serde(alias = "numericAttributes")]
    pub(crate) numeric: HashMap<String, f64>,
    #[serde(alias = "categoricalAttributes")]
    pub(crate) categorical: HashMap<String, CategoricalAttribute>,
}

impl From<Attributes> for ContextAttributes {
    fn from(value: Attributes) -> Self {
        ContextAttributes::from_iter(value)
    }
}

impl<K, V> FromIterator<(K, V)> for ContextAttributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        iter.into_iter().fold(
            ContextAttributes::default(),
            |mut acc, (key, value)| {
                match value.into() {
                    AttributeValue::Number(value) => {
                        acc.numeric.insert(key.into(), value);
                    }
                    value @ (AttributeValue::String(_) | AttributeValue::Boolean(_)) => {
                        acc.categorical
                            .insert(key.into(), CategoricalAttribute(value));
                    }
                    AttributeValue::Null => {
                        // Nulls are missing values and are ignored.
                    }
                }
                acc
            },
        )
    }
}

impl ContextAttributes {
    /// Build from already-classified maps.
    pub fn new(
        numeric: HashMap<String, f64>,
        categorical: HashMap<String, AttributeValue>,
    ) -> ContextAttributes {
        ContextAttributes {
            numeric,
            categorical: categorical
                .into_iter()
                .map(|(k, v)| (k, CategoricalAttribute(v)))
                .collect(),
        }
    }

    /// Copy of the numeric attribute map.
    pub fn numeric_attributes(&self) -> HashMap<String, f64> {
        self.numeric.clone()
    }

    /// Copy of the categorical attribute map, with original value types preserved.
    pub fn categorical_attributes(&self) -> HashMap<String, AttributeValue> {
        self.categorical
            .iter()
            .map(|(k, v)| (k.clone(), v.0.clone()))
            .collect()
    }

    /// Flatten back into generic [`Attributes`] for rule matching.
    pub fn to_generic_attributes(&self) -> Attributes {
        let mut result = HashMap::with_capacity(self.numeric.len() + self.categorical.len());
        for (key, value) in self.numeric.iter() {
            result.insert(key.clone(), AttributeValue::Number(*value));
        }
        for (key, value) in self.categorical.iter() {
            result.insert(key.clone(), value.0.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::{AttributeValue, Attributes, ContextAttributes};

    #[test]
    fn classifies_numeric_and_categorical() {
        let attributes: Attributes = [
            ("speed".to_owned(), 10.into()),
            ("color".to_owned(), "red".into()),
        ]
        .into_iter()
        .collect();

        let context = ContextAttributes::from(attributes);
        assert_eq!(
            context.numeric_attributes(),
            [("speed".to_owned(), 10.0)].into_iter().collect()
        );
        assert_eq!(
            context.categorical_attributes(),
            [("color".to_owned(), AttributeValue::String("red".to_owned()))]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn booleans_stay_categorical_with_original_type() {
        let context = ContextAttributes::from_iter([("beta", true)]);
        assert!(context.numeric_attributes().is_empty());
        assert_eq!(
            context.categorical_attributes()["beta"],
            AttributeValue::Boolean(true)
        );
        assert_eq!(
            context.categorical["beta"].to_canonical_string().as_deref(),
            Some("true")
        );
    }

    #[test]
    fn nulls_are_dropped() {
        let context = ContextAttributes::from_iter([("gone", AttributeValue::Null)]);
        assert!(context.numeric_attributes().is_empty());
        assert!(context.categorical_attributes().is_empty());
    }

    #[test]
    fn accessors_return_copies() {
        let context = ContextAttributes::from_iter([("speed", 10.0)]);
        let mut copy = context.numeric_attributes();
        copy.insert("speed".to_owned(), 99.0);
        assert_eq!(context.numeric_attributes()["speed"], 10.0);
    }
}
