//! An immutable snapshot of flags and bandit models.
use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::bandits::{BanditConfiguration, BanditResponse};
use crate::flags::{EvaluationFailure, Flag, FlagsConfig, Timestamp, TryParse};
use crate::Result;

/// A snapshot of all configuration the evaluation engine needs: the flags document and,
/// optionally, the bandit models document. Snapshots are immutable; updates replace the whole
/// snapshot in the [`ConfigurationStore`](crate::ConfigurationStore).
#[derive(Debug)]
pub struct Configuration {
    /// When the snapshot was constructed.
    pub fetched_at: Timestamp,
    /// Flags configuration.
    pub flags: FlagsConfig,
    /// Bandit models, if any flag references one.
    pub bandits: Option<BanditResponse>,
    /// Mapping from flag key to a map from variation value to the bandit it activates.
    /// Precomputed once so that bandit evaluation is a pair of map lookups.
    flag_to_bandit: HashMap<String, HashMap<String, String>>,
}

impl Configuration {
    /// Build a snapshot from already-parsed server responses.
    pub fn from_server_response(
        flags: FlagsConfig,
        bandits: Option<BanditResponse>,
    ) -> Configuration {
        let flag_to_bandit = flags
            .bandits
            .values()
            .flatten()
            .fold(
                HashMap::<String, HashMap<String, String>>::new(),
                |mut acc, variation| {
                    acc.entry(variation.flag_key.clone()).or_default().insert(
                        variation.variation_value.clone(),
                        variation.key.clone(),
                    );
                    acc
                },
            );

        Configuration {
            fetched_at: Utc::now(),
            flags,
            bandits,
            flag_to_bandit,
        }
    }

    /// Build a snapshot from raw JSON documents (e.g. loaded from disk or received through an
    /// application-managed transport).
    pub fn from_json(flags_json: &[u8], bandits_json: Option<&[u8]>) -> Result<Configuration> {
        let flags = serde_json::from_slice(flags_json)?;
        let bandits = bandits_json.map(serde_json::from_slice).transpose()?;
        Ok(Configuration::from_server_response(flags, bandits))
    }

    pub(crate) fn get_flag(&self, flag_key: &str) -> std::result::Result<&Flag, EvaluationFailure> {
        match self.flags.flags.get(flag_key) {
            None => Err(EvaluationFailure::FlagUnrecognized),
            Some(TryParse::Parsed(flag)) => Ok(flag),
            Some(TryParse::ParseFailed(_)) => {
                // The flag exists upstream but this SDK failed to parse it (likely a newer schema
                // than this version understands).
                log::warn!(target: "switchyard", flag_key; "failed to parse flag configuration");
                Err(EvaluationFailure::ConfigurationError)
            }
        }
    }

    /// Key of the bandit activated by serving `variation_value` for the given flag.
    pub(crate) fn get_bandit_key(&self, flag_key: &str, variation_value: &str) -> Option<&str> {
        self.flag_to_bandit
            .get(flag_key)
            .and_then(|variations| variations.get(variation_value))
            .map(String::as_str)
    }

    pub(crate) fn get_bandit(&self, bandit_key: &str) -> Option<&BanditConfiguration> {
        self.bandits.as_ref()?.bandits.get(bandit_key)
    }

    /// Keys of all flags in the snapshot, including ones that failed to parse.
    pub fn flag_keys(&self) -> HashSet<String> {
        self.flags.flags.keys().cloned().collect()
    }

    /// Keys of bandits that are both referenced by a flag and have a model in the snapshot.
    pub fn bandit_keys(&self) -> HashSet<String> {
        let Some(bandits) = &self.bandits else {
            return HashSet::new();
        };
        self.flags
            .bandits
            .keys()
            .filter(|key| bandits.bandits.contains_key(*key))
            .cloned()
            .collect()
    }

    /// Name of the environment the flags configuration belongs to.
    pub fn environment_name(&self) -> &str {
        &self.flags.environment.name
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::Configuration;
    use crate::bandits::{BanditConfiguration, BanditModelData, BanditResponse};
    use crate::flags::{BanditVariation, Environment, FlagsConfig};
    use crate::Error;

    fn empty_flags_config() -> FlagsConfig {
        FlagsConfig {
            created_at: Utc::now(),
            format: Default::default(),
            environment: Environment {
                name: "test".to_owned(),
            },
            flags: HashMap::new(),
            bandits: HashMap::new(),
        }
    }

    fn bandit_variation(bandit_key: &str, flag_key: &str, variation: &str) -> BanditVariation {
        BanditVariation {
            key: bandit_key.to_owned(),
            flag_key: flag_key.to_owned(),
            variation_key: variation.to_owned(),
            variation_value: variation.to_owned(),
        }
    }

    fn bandit_configuration(bandit_key: &str) -> BanditConfiguration {
        BanditConfiguration {
            bandit_key: bandit_key.to_owned(),
            model_name: "falcon".to_owned(),
            model_version: "v1".to_owned(),
            model_data: BanditModelData {
                gamma: 1.0,
                default_action_score: 0.0,
                action_probability_floor: 0.0,
                coefficients: HashMap::new(),
            },
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn flags_document_round_trips() {
        let source = r#"
          {
            "createdAt": "2024-07-18T00:00:00Z",
            "format": "CLIENT",
            "environment": {"name": "prod"},
            "flags": {
              "greeting": {
                "key": "greeting",
                "enabled": true,
                "variationType": "STRING",
                "variations": {"hi": {"key": "hi", "value": "hi"}},
                "allocations": []
              }
            }
          }
        "#;
        let configuration = Configuration::from_json(source.as_bytes(), None).unwrap();
        let serialized = serde_json::to_vec(&configuration.flags).unwrap();
        let reparsed = Configuration::from_json(&serialized, None).unwrap();
        assert_eq!(reparsed.flag_keys(), configuration.flag_keys());
        assert_eq!(reparsed.environment_name(), "prod");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = Configuration::from_json(b"{", None);
        assert!(matches!(
            result.unwrap_err(),
            Error::ConfigurationParseError(_)
        ));
    }

    #[test]
    fn bandit_index_maps_variation_values_to_bandits() {
        let mut flags = empty_flags_config();
        flags.bandits.insert(
            "recs".to_owned(),
            vec![bandit_variation("recs", "shoes_flag", "recs")],
        );
        let bandits = BanditResponse {
            bandits: [("recs".to_owned(), bandit_configuration("recs"))].into(),
            updated_at: Utc::now(),
        };

        let configuration = Configuration::from_server_response(flags, Some(bandits));
        assert_eq!(configuration.get_bandit_key("shoes_flag", "recs"), Some("recs"));
        assert_eq!(configuration.get_bandit_key("shoes_flag", "other"), None);
        assert_eq!(configuration.get_bandit_key("other_flag", "recs"), None);
        assert!(configuration.get_bandit("recs").is_some());
    }

    #[test]
    fn bandit_keys_require_both_reference_and_model() {
        let mut flags = empty_flags_config();
        flags.bandits.insert(
            "recs".to_owned(),
            vec![bandit_variation("recs", "shoes_flag", "recs")],
        );
        flags.bandits.insert(
            "orphan".to_owned(),
            vec![bandit_variation("orphan", "hats_flag", "orphan")],
        );
        let bandits = BanditResponse {
            bandits: [("recs".to_owned(), bandit_configuration("recs"))].into(),
            updated_at: Utc::now(),
        };

        let configuration = Configuration::from_server_response(flags, Some(bandits));
        assert_eq!(
            configuration.bandit_keys(),
            ["recs".to_owned()].into_iter().collect()
        );
    }

    #[test]
    fn no_bandit_response_means_no_bandit_keys() {
        let mut flags = empty_flags_config();
        flags.bandits.insert(
            "recs".to_owned(),
            vec![bandit_variation("recs", "shoes_flag", "recs")],
        );
        let configuration = Configuration::from_server_response(flags, None);
        assert!(configuration.bandit_keys().is_empty());
        assert!(configuration.get_bandit("recs").is_none());
    }
}
