//! A client-side feature flagging and contextual bandit evaluation engine.
//!
//! # Overview
//!
//! The crate revolves around a [`Client`] that evaluates feature flag values for "subjects",
//! where each subject has a unique key and key-value attributes associated with it. The client
//! downloads a configuration snapshot in the background, hot-swaps it atomically, and serves
//! evaluations from whatever snapshot is current. Two clients holding the same configuration
//! produce identical assignments for the same input, here and in the other language SDKs.
//!
//! # Typed assignments
//!
//! Every flag has a return type that is fixed on creation. Assignments in code are made with
//! the corresponding typed function:
//! - [`Client::get_string_assignment()`]
//! - [`Client::get_integer_assignment()`]
//! - [`Client::get_numeric_assignment()`]
//! - [`Client::get_boolean_assignment()`]
//! - [`Client::get_json_assignment()`]
//!
//! These functions never fail: on any problem (configuration not fetched yet, unknown flag,
//! type mismatch, client shut down) they return the caller-supplied default. The `*_details`
//! variants additionally report an [`EvaluationReason`](flags::EvaluationReason) explaining the
//! outcome.
//!
//! # Bandits
//!
//! Flags may route traffic to a contextual bandit. [`Client::get_bandit_action()`] evaluates
//! the flag and, when the assigned variation activates a bandit, scores the supplied actions
//! with the bandit's linear model and deterministically selects one.
//!
//! # Assignment logger
//!
//! An [`AssignmentLogger`] should be provided to save assignment events to your storage,
//! facilitating tracking of which subject received which feature flag values.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate (under the `switchyard`
//! target) for messages. Consider integrating a `log`-compatible logger implementation for
//! better visibility into engine operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod assignment_logger;
mod attributes;
mod client;
mod client_config;
mod configuration;
mod configuration_fetcher;
mod configuration_store;
mod context_attributes;
mod error;
mod events;
mod poller;
mod sharder;

pub mod bandits;
pub mod flags;

pub use assignment_logger::AssignmentLogger;
pub use attributes::{attributes_from_json, AttributeValue, Attributes};
pub use bandits::BanditResult;
pub use client::Client;
pub use client_config::ClientConfig;
pub use configuration::Configuration;
pub use configuration_fetcher::{ConfigurationFetcher, ConfigurationFetcherConfig};
pub use configuration_store::ConfigurationStore;
pub use context_attributes::{CategoricalAttribute, ContextAttributes};
pub use error::{Error, Result};
pub use events::{AssignmentEvent, BanditEvent, EventMetaData};
pub use flags::{AssignmentDetails, AssignmentValue};
pub use poller::{PollerThread, PollerThreadConfig};
pub use sharder::{Md5Sharder, Sharder};
