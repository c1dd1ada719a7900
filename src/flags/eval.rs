use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    events::{AssignmentEvent, EventMetaData},
    flags::{Allocation, Flag, Shard, Split, Timestamp, VariationType},
    sharder::{Md5Sharder, Sharder},
    Attributes, Configuration,
};

use super::assignment::{Assignment, EvaluationReason};

/// Internal outcome when flag evaluation produces no assignment. Never surfaced to callers as an
/// error: the client absorbs it into the default value plus an [`EvaluationReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvaluationFailure {
    ConfigurationMissing,
    FlagUnrecognized,
    FlagDisabled,
    NoAllocationMatch,
    TypeMismatch {
        expected: VariationType,
        found: VariationType,
    },
    ConfigurationError,
}

impl EvaluationFailure {
    pub(crate) fn reason(self) -> EvaluationReason {
        match self {
            EvaluationFailure::ConfigurationMissing => EvaluationReason::ConfigurationMissing,
            EvaluationFailure::FlagUnrecognized => EvaluationReason::FlagUnrecognized,
            EvaluationFailure::FlagDisabled => EvaluationReason::FlagDisabled,
            EvaluationFailure::NoAllocationMatch => EvaluationReason::NoMatch,
            EvaluationFailure::TypeMismatch { .. } => EvaluationReason::TypeMismatch,
            EvaluationFailure::ConfigurationError => EvaluationReason::ConfigurationError,
        }
    }

    /// Normal fallbacks are expected in regular operation and are only traced; the rest signal a
    /// misconfiguration and are logged at warn level by the caller.
    pub(crate) fn is_normal(self) -> bool {
        matches!(
            self,
            EvaluationFailure::ConfigurationMissing
                | EvaluationFailure::FlagUnrecognized
                | EvaluationFailure::FlagDisabled
                | EvaluationFailure::NoAllocationMatch
        )
    }
}

/// Evaluate a flag for the given subject against a configuration snapshot.
pub(crate) fn evaluate_flag(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &Arc<Attributes>,
    expected_type: Option<VariationType>,
    now: DateTime<Utc>,
) -> Result<Assignment, EvaluationFailure> {
    let configuration = configuration.ok_or(EvaluationFailure::ConfigurationMissing)?;
    let flag = configuration.get_flag(flag_key)?;

    if let Some(expected) = expected_type {
        if flag.variation_type != expected {
            return Err(EvaluationFailure::TypeMismatch {
                expected,
                found: flag.variation_type,
            });
        }
    }

    if !flag.enabled {
        return Err(EvaluationFailure::FlagDisabled);
    }

    flag.eval(subject_key, subject_attributes, now)
}

impl Flag {
    fn eval(
        &self,
        subject_key: &str,
        subject_attributes: &Arc<Attributes>,
        now: DateTime<Utc>,
    ) -> Result<Assignment, EvaluationFailure> {
        // The subject key is visible to rules as the `id` attribute unless the caller supplied
        // their own.
        let augmented_attributes = {
            let mut attrs = Attributes::clone(subject_attributes);
            attrs
                .entry("id".to_owned())
                .or_insert_with(|| subject_key.into());
            attrs
        };

        let (allocation, split) = self
            .allocations
            .iter()
            .find_map(|allocation| {
                allocation
                    .matching_split(subject_key, &augmented_attributes, self.total_shards, now)
                    .map(|split| (allocation, split))
            })
            .ok_or(EvaluationFailure::NoAllocationMatch)?;

        let variation = self.variations.get(&split.variation_key).ok_or_else(|| {
            log::warn!(target: "switchyard",
                       flag_key:display = self.key,
                       subject_key,
                       variation_key:display = split.variation_key;
                       "split references a variation that is not in the flag");
            EvaluationFailure::ConfigurationError
        })?;

        let value = variation
            .value
            .to_assignment_value(self.variation_type)
            .ok_or_else(|| {
                log::warn!(target: "switchyard",
                           flag_key:display = self.key,
                           subject_key,
                           variation_key:display = variation.key;
                           "variation value does not match the flag's variation type");
                EvaluationFailure::ConfigurationError
            })?;

        let event = allocation.do_log.then(|| AssignmentEvent {
            feature_flag: self.key.clone(),
            allocation: allocation.key.clone(),
            experiment: format!("{}-{}", self.key, allocation.key),
            variation: variation.key.clone(),
            subject: subject_key.to_owned(),
            subject_attributes: subject_attributes.clone(),
            timestamp: now,
            meta_data: EventMetaData::default(),
            extra_logging: split.extra_logging.clone(),
        });

        Ok(Assignment {
            value,
            allocation_key: allocation.key.clone(),
            variation_key: variation.key.clone(),
            event,
        })
    }
}

impl Allocation {
    fn matching_split(
        &self,
        subject_key: &str,
        augmented_attributes: &Attributes,
        total_shards: u64,
        now: Timestamp,
    ) -> Option<&Split> {
        if matches!(self.start_at, Some(t) if now < t) {
            return None;
        }
        if matches!(self.end_at, Some(t) if now > t) {
            return None;
        }

        let allowed_by_rules =
            self.rules.is_empty() || self.rules.iter().any(|rule| rule.eval(augmented_attributes));
        if !allowed_by_rules {
            return None;
        }

        self.splits
            .iter()
            .find(|split| split.matches(subject_key, total_shards))
    }
}

impl Split {
    /// A subject matches a split when it matches all of the split's shards.
    fn matches(&self, subject_key: &str, total_shards: u64) -> bool {
        self.shards
            .iter()
            .all(|shard| shard.matches(subject_key, total_shards))
    }
}

impl Shard {
    fn matches(&self, subject_key: &str, total_shards: u64) -> bool {
        let bucket =
            Md5Sharder.get_shard(format!("{}-{}", self.salt, subject_key), total_shards);
        self.ranges.iter().any(|range| range.contains(bucket))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::{evaluate_flag, EvaluationFailure};
    use crate::flags::{
        Allocation, AssignmentValue, Condition, ConditionOperator, Flag, FlagsConfig, Rule, Shard,
        ShardRange, Split, TryParse, Variation, VariationType,
    };
    use crate::{Attributes, Configuration};

    fn full_range_split(variation_key: &str) -> Split {
        Split {
            shards: vec![],
            variation_key: variation_key.to_owned(),
            extra_logging: HashMap::new(),
        }
    }

    fn test_flag(allocations: Vec<Allocation>) -> Flag {
        Flag {
            key: "numeric_flag".to_owned(),
            enabled: true,
            variation_type: VariationType::String,
            variations: [(
                "on".to_owned(),
                Variation {
                    key: "on".to_owned(),
                    value: "on".into(),
                },
            )]
            .into(),
            allocations,
            total_shards: 10_000,
        }
    }

    fn configuration_with(flag: Flag) -> Configuration {
        Configuration::from_server_response(
            FlagsConfig {
                created_at: Utc::now(),
                format: Default::default(),
                environment: crate::flags::Environment {
                    name: "test".to_owned(),
                },
                flags: [(flag.key.clone(), TryParse::Parsed(flag))].into(),
                bandits: HashMap::new(),
            },
            None,
        )
    }

    fn match_all_allocation() -> Allocation {
        Allocation {
            key: "rollout".to_owned(),
            rules: vec![],
            start_at: None,
            end_at: None,
            splits: vec![full_range_split("on")],
            do_log: true,
        }
    }

    #[test]
    fn assigns_variation_when_allocation_matches_all() {
        let _ = env_logger::builder().is_test(true).try_init();

        let configuration = configuration_with(test_flag(vec![match_all_allocation()]));

        let assignment = evaluate_flag(
            Some(&configuration),
            "numeric_flag",
            "alice",
            &Arc::new(Attributes::new()),
            Some(VariationType::String),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(assignment.value, AssignmentValue::String("on".to_owned()));
        assert_eq!(assignment.allocation_key, "rollout");
        let event = assignment.event.unwrap();
        assert_eq!(event.experiment, "numeric_flag-rollout");
        assert_eq!(event.variation, "on");
    }

    #[test]
    fn missing_flag_is_unrecognized() {
        let configuration = configuration_with(test_flag(vec![match_all_allocation()]));
        let result = evaluate_flag(
            Some(&configuration),
            "other_flag",
            "alice",
            &Arc::new(Attributes::new()),
            None,
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), EvaluationFailure::FlagUnrecognized);
    }

    #[test]
    fn disabled_flag_yields_no_assignment() {
        let mut flag = test_flag(vec![match_all_allocation()]);
        flag.enabled = false;
        let configuration = configuration_with(flag);
        let result = evaluate_flag(
            Some(&configuration),
            "numeric_flag",
            "alice",
            &Arc::new(Attributes::new()),
            None,
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), EvaluationFailure::FlagDisabled);
    }

    #[test]
    fn type_mismatch_is_detected_before_evaluation() {
        let configuration = configuration_with(test_flag(vec![match_all_allocation()]));
        let result = evaluate_flag(
            Some(&configuration),
            "numeric_flag",
            "alice",
            &Arc::new(Attributes::new()),
            Some(VariationType::Boolean),
            Utc::now(),
        );
        assert!(matches!(
            result.unwrap_err(),
            EvaluationFailure::TypeMismatch { .. }
        ));
    }

    #[test]
    fn allocation_outside_active_window_is_skipped() {
        let now = Utc::now();
        let mut not_started = match_all_allocation();
        not_started.start_at = Some(now + Duration::hours(1));
        let mut ended = match_all_allocation();
        ended.key = "ended".to_owned();
        ended.end_at = Some(now - Duration::hours(1));

        let configuration = configuration_with(test_flag(vec![not_started, ended]));
        let result = evaluate_flag(
            Some(&configuration),
            "numeric_flag",
            "alice",
            &Arc::new(Attributes::new()),
            None,
            now,
        );
        assert_eq!(result.unwrap_err(), EvaluationFailure::NoAllocationMatch);
    }

    #[test]
    fn first_matching_allocation_wins() {
        let mut gated = match_all_allocation();
        gated.key = "gated".to_owned();
        gated.rules = vec![Rule {
            conditions: vec![Condition {
                attribute: "id".to_owned(),
                operator: ConditionOperator::OneOf,
                value: vec!["alice".to_owned()].into(),
            }],
        }];
        let mut fallback = match_all_allocation();
        fallback.key = "fallback".to_owned();

        let configuration = configuration_with(test_flag(vec![gated, fallback]));

        let attrs = Arc::new(Attributes::new());
        let alice = evaluate_flag(
            Some(&configuration),
            "numeric_flag",
            "alice",
            &attrs,
            None,
            Utc::now(),
        )
        .unwrap();
        // Subject key is injected as the `id` attribute, so the gated allocation matches alice.
        assert_eq!(alice.allocation_key, "gated");

        let bob = evaluate_flag(
            Some(&configuration),
            "numeric_flag",
            "bob",
            &attrs,
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(bob.allocation_key, "fallback");
    }

    #[test]
    fn empty_shard_ranges_never_match() {
        let mut allocation = match_all_allocation();
        allocation.splits = vec![Split {
            shards: vec![Shard {
                salt: "salt".to_owned(),
                ranges: vec![ShardRange { start: 0, end: 0 }],
            }],
            variation_key: "on".to_owned(),
            extra_logging: HashMap::new(),
        }];
        let configuration = configuration_with(test_flag(vec![allocation]));
        let result = evaluate_flag(
            Some(&configuration),
            "numeric_flag",
            "alice",
            &Arc::new(Attributes::new()),
            None,
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), EvaluationFailure::NoAllocationMatch);
    }

    #[test]
    fn no_configuration_yields_missing() {
        let result = evaluate_flag(
            None,
            "numeric_flag",
            "alice",
            &Arc::new(Attributes::new()),
            None,
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), EvaluationFailure::ConfigurationMissing);
    }
}
