use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bandits::{
    BanditModelData, CategoricalAttributeCoefficient, NumericAttributeCoefficient,
};
use crate::events::{AssignmentEvent, BanditEvent, EventMetaData};
use crate::flags::{evaluate_flag, AssignmentValue};
use crate::sharder::{Md5Sharder, Sharder};
use crate::{Configuration, ContextAttributes};

// Denominator for the deterministic pseudo-random draw and the action shuffle. Not configurable:
// it must match other SDK implementations.
const BANDIT_TOTAL_SHARDS: u64 = 10_000;

/// Result of evaluating a bandit-capable flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanditResult {
    /// Variation assigned by the flag (the caller-supplied default on any fallback).
    pub variation: AssignmentValue,
    /// Selected bandit action, if the variation is bandit-linked.
    pub action: Option<String>,
    /// Flag assignment event to deliver to the assignment logger.
    pub assignment_event: Option<AssignmentEvent>,
    /// Bandit selection event to deliver to the assignment logger.
    pub bandit_event: Option<BanditEvent>,
}

impl fmt::Display for BanditResult {
    /// The action when present, otherwise the lossless string form of the variation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Some(action) => f.write_str(action),
            None => f.write_str(&self.variation.to_display_string()),
        }
    }
}

pub(crate) struct BanditSelection {
    pub(crate) action_key: String,
    /// Selection weight of the chosen action.
    pub(crate) action_weight: f64,
    /// Distance between the best and the selected actions' scores.
    pub(crate) optimality_gap: f64,
}

/// Evaluate the flag for the given subject; if the assigned variation is bandit-linked, select an
/// action among `actions` using the bandit's scoring model.
///
/// Never fails: any fallback returns `default_variation` with no action.
pub(crate) fn get_bandit_action(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &ContextAttributes,
    actions: &HashMap<String, ContextAttributes>,
    default_variation: &str,
    now: DateTime<Utc>,
) -> BanditResult {
    let default_result = |assignment_event| BanditResult {
        variation: AssignmentValue::String(default_variation.to_owned()),
        action: None,
        assignment_event,
        bandit_event: None,
    };

    let Some(configuration) = configuration else {
        return default_result(None);
    };

    let assignment = match evaluate_flag(
        Some(configuration),
        flag_key,
        subject_key,
        &Arc::new(subject_attributes.to_generic_attributes()),
        None,
        now,
    ) {
        Ok(assignment) => assignment,
        Err(failure) => {
            log::trace!(target: "switchyard",
                        flag_key,
                        subject_key;
                        "returning default variation for bandit flag: {failure:?}");
            return default_result(None);
        }
    };

    let variation_value = assignment.value.to_display_string();

    let Some(bandit_key) = configuration.get_bandit_key(flag_key, &variation_value) else {
        // Not a bandit variation; return the plain assignment.
        return BanditResult {
            variation: assignment.value,
            action: None,
            assignment_event: assignment.event,
            bandit_event: None,
        };
    };

    let Some(bandit) = configuration.get_bandit(bandit_key) else {
        // The flag references a bandit but its model is absent from the configuration. This means
        // the flags and bandits documents are out of sync; resolve to the default and skip the
        // assignment event, since the assigned variation is not served.
        log::warn!(target: "switchyard", bandit_key; "bandit referenced by flag has no model");
        return default_result(None);
    };

    let Some(selection) =
        bandit
            .model_data
            .select_action(flag_key, subject_key, subject_attributes, actions)
    else {
        // Empty action set (or NaN scores). The bandit variation cannot be served without an
        // action, so resolve to the default without logging the assignment.
        return default_result(None);
    };

    let action_attributes = &actions[&selection.action_key];
    let bandit_event = BanditEvent {
        flag_key: flag_key.to_owned(),
        bandit_key: bandit_key.to_owned(),
        subject: subject_key.to_owned(),
        action: selection.action_key.clone(),
        action_probability: selection.action_weight,
        optimality_gap: selection.optimality_gap,
        model_version: bandit.model_version.clone(),
        timestamp: now,
        subject_numeric_attributes: subject_attributes.numeric_attributes(),
        subject_categorical_attributes: subject_attributes.categorical_attributes(),
        action_numeric_attributes: action_attributes.numeric_attributes(),
        action_categorical_attributes: action_attributes.categorical_attributes(),
        meta_data: EventMetaData::default(),
    };

    BanditResult {
        variation: assignment.value,
        action: Some(selection.action_key),
        assignment_event: assignment.event,
        bandit_event: Some(bandit_event),
    }
}

impl BanditModelData {
    /// Score all actions and deterministically select one. Returns `None` for an empty action
    /// set.
    pub(crate) fn select_action(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &ContextAttributes,
        actions: &HashMap<String, ContextAttributes>,
    ) -> Option<BanditSelection> {
        if actions.is_empty() {
            return None;
        }

        let scores: HashMap<&String, f64> = actions
            .iter()
            .map(|(key, attributes)| (key, self.score_action(key, attributes, subject_attributes)))
            .collect();

        // Ties break toward the lexicographically-smaller action key so the ranking is
        // reproducible across runs and implementations.
        let (best_action, best_score) = scores
            .iter()
            .max_by(|a, b| f64::total_cmp(a.1, b.1).then_with(|| Ord::cmp(a.0, b.0).reverse()))
            .map(|(k, v)| (*k, *v))?;

        let weights = self.weigh_actions(&scores, best_action, best_score);

        // Deterministic per-subject shuffle of the actions. When weights drift slightly between
        // model updates, subjects pushed off an action scatter across the remaining actions
        // instead of all landing on the same neighbor.
        let shuffled_actions = {
            let mut keys: Vec<&String> = actions.keys().collect();
            keys.sort_by_cached_key(|&action_key| {
                let bucket = Md5Sharder.get_shard(
                    format!("{flag_key}-{subject_key}-{action_key}"),
                    BANDIT_TOTAL_SHARDS,
                );
                (bucket, action_key.clone())
            });
            keys
        };

        let draw = Md5Sharder.get_shard(format!("{flag_key}-{subject_key}"), BANDIT_TOTAL_SHARDS)
            as f64
            / BANDIT_TOTAL_SHARDS as f64;

        let selected_action = {
            let mut cumulative_weight = 0.0;
            *shuffled_actions
                .iter()
                .find(|&&action_key| {
                    cumulative_weight += weights[action_key];
                    cumulative_weight > draw
                })
                .or_else(|| shuffled_actions.last())?
        };

        Some(BanditSelection {
            action_key: selected_action.clone(),
            action_weight: weights[selected_action],
            optimality_gap: best_score - scores[selected_action],
        })
    }

    /// Convert scores to selection weights. Every non-best action gets
    /// `max(floor/n, 1/(n + gamma*(best_score-score)))`; the best action takes the non-negative
    /// remainder, so weights sum to 1.
    fn weigh_actions<'a>(
        &self,
        scores: &HashMap<&'a String, f64>,
        best_action: &'a String,
        best_score: f64,
    ) -> HashMap<&'a String, f64> {
        let n_actions = scores.len() as f64;
        let min_probability = self.action_probability_floor / n_actions;

        let mut weights = HashMap::with_capacity(scores.len());
        let mut remainder = 1.0;
        for (&action, &score) in scores {
            if action != best_action {
                let weight =
                    min_probability.max(1.0 / (n_actions + self.gamma * (best_score - score)));
                weights.insert(action, weight);
                remainder -= weight;
            }
        }
        weights.insert(best_action, remainder.max(0.0));

        weights
    }

    fn score_action(
        &self,
        action_key: &str,
        action_attributes: &ContextAttributes,
        subject_attributes: &ContextAttributes,
    ) -> f64 {
        let Some(coefficients) = self.coefficients.get(action_key) else {
            return self.default_action_score;
        };

        coefficients.intercept
            + score_attributes(
                action_attributes,
                &coefficients.action_numeric_coefficients,
                &coefficients.action_categorical_coefficients,
            )
            + score_attributes(
                subject_attributes,
                &coefficients.subject_numeric_coefficients,
                &coefficients.subject_categorical_coefficients,
            )
    }
}

fn score_attributes(
    attributes: &ContextAttributes,
    numeric_coefficients: &[NumericAttributeCoefficient],
    categorical_coefficients: &[CategoricalAttributeCoefficient],
) -> f64 {
    numeric_coefficients
        .iter()
        .map(|coef| {
            attributes
                .numeric
                .get(&coef.attribute_key)
                .copied()
                // Non-finite attributes would poison the whole score.
                .filter(|n| n.is_finite())
                .map(|value| value * coef.coefficient)
                .unwrap_or(coef.missing_value_coefficient)
        })
        .chain(categorical_coefficients.iter().map(|coef| {
            attributes
                .categorical
                .get(&coef.attribute_key)
                .and_then(|value| value.to_canonical_string())
                .and_then(|value| coef.value_coefficients.get(&value))
                .copied()
                .unwrap_or(coef.missing_value_coefficient)
        }))
        .sum()
}
