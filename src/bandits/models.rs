#![allow(missing_docs)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flags::Timestamp;

/// The bandit models document as served over the wire.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditResponse {
    pub bandits: HashMap<String, BanditConfiguration>,
    pub updated_at: Timestamp,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditConfiguration {
    pub bandit_key: String,
    pub model_name: String,
    pub model_version: String,
    pub model_data: BanditModelData,
    pub updated_at: Timestamp,
}

/// Parameters of a bandit's linear scoring model.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BanditModelData {
    /// Exploration-decay exponent: larger values concentrate weight on the best action.
    pub gamma: f64,
    /// Score assigned to actions with no coefficient entry.
    pub default_action_score: f64,
    /// Minimum weight share; each action's weight is floored at
    /// `action_probability_floor / num_actions`.
    pub action_probability_floor: f64,
    pub coefficients: HashMap<String, ActionCoefficients>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ActionCoefficients {
    pub action_key: String,
    pub intercept: f64,
    pub subject_numeric_coefficients: Vec<NumericAttributeCoefficient>,
    pub subject_categorical_coefficients: Vec<CategoricalAttributeCoefficient>,
    pub action_numeric_coefficients: Vec<NumericAttributeCoefficient>,
    pub action_categorical_coefficients: Vec<CategoricalAttributeCoefficient>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NumericAttributeCoefficient {
    pub attribute_key: String,
    pub coefficient: f64,
    /// Contribution when the attribute is absent (or not finite).
    pub missing_value_coefficient: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalAttributeCoefficient {
    pub attribute_key: String,
    pub value_coefficients: HashMap<String, f64>,
    /// Contribution when the attribute is absent or its value has no coefficient.
    pub missing_value_coefficient: f64,
}

#[cfg(test)]
mod tests {
    use super::BanditResponse;

    #[test]
    fn parses_model_document() {
        let response: BanditResponse = serde_json::from_str(
            r#"
              {
                "updatedAt": "2024-07-18T00:00:00Z",
                "bandits": {
                  "banner": {
                    "banditKey": "banner",
                    "modelName": "falcon",
                    "updatedAt": "2024-07-18T00:00:00Z",
                    "modelVersion": "v123",
                    "modelData": {
                      "gamma": 1.0,
                      "defaultActionScore": 0.0,
                      "actionProbabilityFloor": 0.1,
                      "coefficients": {
                        "nike": {
                          "actionKey": "nike",
                          "intercept": 1.0,
                          "actionNumericCoefficients": [],
                          "actionCategoricalCoefficients": [],
                          "subjectNumericCoefficients": [
                            {"attributeKey": "age", "coefficient": 0.1, "missingValueCoefficient": 0.0}
                          ],
                          "subjectCategoricalCoefficients": []
                        }
                      }
                    }
                  }
                }
              }
            "#,
        )
        .unwrap();

        let model = &response.bandits["banner"].model_data;
        assert_eq!(model.gamma, 1.0);
        assert_eq!(
            model.coefficients["nike"].subject_numeric_coefficients[0].attribute_key,
            "age"
        );
    }
}
