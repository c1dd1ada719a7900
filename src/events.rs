//! Events emitted during evaluation. They are handed to the configured
//! [`AssignmentLogger`](crate::AssignmentLogger) for delivery to the application's analytics
//! storage; the engine itself never transports them anywhere.
use std::{collections::HashMap, sync::Arc};

use serde::Serialize;

use crate::{AttributeValue, Attributes};

/// An assignment of a flag variation to a subject, emitted when the matched allocation has
/// logging enabled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    /// Key of the evaluated feature flag.
    pub feature_flag: String,
    /// Key of the matched allocation.
    pub allocation: String,
    /// Composite `flag-allocation` experiment key.
    pub experiment: String,
    /// Key of the assigned variation.
    pub variation: String,
    /// Key of the subject that received the assignment.
    pub subject: String,
    /// Subject attributes at evaluation time.
    pub subject_attributes: Arc<Attributes>,
    /// When the assignment happened.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// SDK name and version.
    pub meta_data: EventMetaData,
    /// Extra logging fields configured on the matched split.
    #[serde(flatten)]
    pub extra_logging: HashMap<String, String>,
}

/// A bandit action selection, emitted alongside the assignment event when a bandit was
/// evaluated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BanditEvent {
    pub flag_key: String,
    pub bandit_key: String,
    pub subject: String,
    pub action: String,
    pub action_probability: f64,
    pub optimality_gap: f64,
    pub model_version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub subject_numeric_attributes: HashMap<String, f64>,
    pub subject_categorical_attributes: HashMap<String, AttributeValue>,
    pub action_numeric_attributes: HashMap<String, f64>,
    pub action_categorical_attributes: HashMap<String, AttributeValue>,
    pub meta_data: EventMetaData,
}

/// SDK name and version attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct EventMetaData {
    pub sdk_name: &'static str,
    pub sdk_version: &'static str,
}

impl Default for EventMetaData {
    fn default() -> EventMetaData {
        EventMetaData {
            sdk_name: env!("CARGO_PKG_NAME"),
            sdk_version: env!("CARGO_PKG_VERSION"),
        }
    }
}
