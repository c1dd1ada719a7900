//! The user-facing evaluation client.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};

use chrono::Utc;

use crate::assignment_logger::AssignmentLogger;
use crate::bandits::{self, BanditResult};
use crate::configuration_fetcher::{ConfigurationFetcher, ConfigurationFetcherConfig};
use crate::configuration_store::ConfigurationStore;
use crate::events::{AssignmentEvent, BanditEvent};
use crate::flags::{
    evaluate_flag, AssignmentDetails, AssignmentValue, EvaluationReason, VariationType,
};
use crate::poller::{wait_first_fetch, PollerThread, PollerThreadConfig};
use crate::{Attributes, ClientConfig, Configuration, ContextAttributes, Result};

/// Lifecycle of a client. States only move forward; `Shutdown` is terminal and reachable from
/// any state. `Failed` means the first fetch failed unrecoverably; a manually installed
/// configuration can still move the client to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LifecycleState {
    Uninitialized,
    Initializing,
    Failed,
    Ready,
    Shutdown,
}

struct Lifecycle {
    state: Mutex<LifecycleState>,
    changed: Condvar,
}

impl Lifecycle {
    fn new() -> Lifecycle {
        Lifecycle {
            state: Mutex::new(LifecycleState::Uninitialized),
            changed: Condvar::new(),
        }
    }

    fn current(&self) -> LifecycleState {
        *self.lock()
    }

    /// Move to `to` if that is a forward transition. Returns whether the state changed, so the
    /// first of several concurrent shutdowns can be told apart from the rest.
    fn advance(&self, to: LifecycleState) -> bool {
        let mut state = self.lock();
        if *state >= to {
            return false;
        }
        *state = to;
        self.changed.notify_all();
        true
    }

    /// Block until the client is `Ready`, `Failed`, or `Shutdown`.
    fn wait_settled(&self) {
        let mut state = self.lock();
        while *state < LifecycleState::Failed {
            state = match self.changed.wait(state) {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LifecycleState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The feature-flag and bandit evaluation client.
///
/// A client owns a configuration store, a background poller (unless polling is disabled), and
/// the assignment logger. It is `Sync`: one instance is meant to be shared across all
/// application threads.
///
/// Assignment getters never fail. Whatever goes wrong (no configuration yet, unknown flag, type
/// mismatch, client shut down), they return the caller-supplied default; use the `*_details`
/// variants to see why.
///
/// # Examples
///
/// ```no_run
/// # use switchyard::{Client, ClientConfig};
/// let client = Client::new(ClientConfig::from_api_key("api-key"))?;
/// client.wait_for_initialization();
/// let assignment = client.get_boolean_assignment(
///     "new-checkout",
///     "user-1",
///     &Default::default(),
///     false,
/// );
/// # Ok::<(), switchyard::Error>(())
/// ```
pub struct Client {
    assignment_logger: Box<dyn AssignmentLogger + Send + Sync>,
    configuration_store: Arc<ConfigurationStore>,
    lifecycle: Arc<Lifecycle>,
    poller: Mutex<Option<PollerThread>>,
}

impl Client {
    /// Create a client and, unless polling is disabled, start the background poller.
    ///
    /// Returns as soon as the poller is spawned; evaluation before the first configuration
    /// arrives returns defaults. Call [`Client::wait_for_initialization`] to block until the
    /// client is ready.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyApiKey`](crate::Error::EmptyApiKey),
    /// [`Error::MissingConfigurationSource`](crate::Error::MissingConfigurationSource), or
    /// [`Error::InvalidPollInterval`](crate::Error::InvalidPollInterval) if the configuration is
    /// invalid, and [`Error::Io`](crate::Error::Io) if spawning the poller thread fails.
    pub fn new(config: ClientConfig) -> Result<Client> {
        config.validate()?;
        let ClientConfig {
            api_key,
            base_url,
            assignment_logger,
            poll_interval,
            poll_jitter,
            initial_configuration,
        } = config;

        let configuration_store = Arc::new(ConfigurationStore::new());
        let lifecycle = Arc::new(Lifecycle::new());

        if let Some(configuration) = initial_configuration {
            configuration_store.set_configuration(Arc::new(configuration));
            lifecycle.advance(LifecycleState::Ready);
        } else {
            lifecycle.advance(LifecycleState::Initializing);
        }

        let poller = match poll_interval {
            Some(interval) => {
                let fetcher = ConfigurationFetcher::new(ConfigurationFetcherConfig {
                    base_url,
                    api_key,
                    sdk_name: env!("CARGO_PKG_NAME").to_owned(),
                    sdk_version: env!("CARGO_PKG_VERSION").to_owned(),
                });
                let poller = PollerThread::start_with_config(
                    fetcher,
                    Arc::clone(&configuration_store),
                    PollerThreadConfig::new()
                        .with_interval(interval)
                        .with_jitter(poll_jitter),
                )?;

                // Bridge the poller's first fetch to the lifecycle. The thread exits after the
                // first result; the poller publishes one on every exit path, so this never
                // leaks a blocked thread.
                let signal = poller.first_fetch_signal();
                let lifecycle = Arc::clone(&lifecycle);
                std::thread::Builder::new()
                    .name("switchyard-init".to_owned())
                    .spawn(move || match wait_first_fetch(&signal) {
                        Ok(()) => {
                            lifecycle.advance(LifecycleState::Ready);
                        }
                        Err(err) => {
                            // The poller is gone and no configuration is coming; settle the
                            // lifecycle so initialization waiters are not stuck. After a
                            // shutdown this is a no-op.
                            log::warn!(target: "switchyard",
                                       "initialization failed: {err}");
                            lifecycle.advance(LifecycleState::Failed);
                        }
                    })?;

                Some(poller)
            }
            None => None,
        };

        Ok(Client {
            assignment_logger,
            configuration_store,
            lifecycle,
            poller: Mutex::new(poller),
        })
    }

    /// Whether the client holds a configuration and is serving real assignments.
    pub fn is_initialized(&self) -> bool {
        self.lifecycle.current() == LifecycleState::Ready
    }

    /// Block the calling thread until the client becomes ready, fails to initialize, or is shut
    /// down. Initialization fails when the first fetch hits an unrecoverable error (bad API key,
    /// malformed base URL); check [`Client::is_initialized`] afterwards to tell the outcomes
    /// apart. There is no timeout; callers needing a bounded wait should layer their own.
    pub fn wait_for_initialization(&self) {
        self.lifecycle.wait_settled();
    }

    /// Shut the client down: stop the poller and release the held configuration. Idempotent;
    /// concurrent calls are safe and only the first performs teardown. Waiters blocked in
    /// [`Client::wait_for_initialization`] are woken.
    ///
    /// Evaluations already in flight finish against the snapshot they hold; subsequent calls
    /// return defaults.
    pub fn shutdown(&self) {
        if !self.lifecycle.advance(LifecycleState::Shutdown) {
            return;
        }
        let poller = {
            let mut lock = match self.poller.lock() {
                Ok(lock) => lock,
                Err(poisoned) => poisoned.into_inner(),
            };
            lock.take()
        };
        if let Some(poller) = poller {
            // Not joining: the poller may be mid-fetch and there is nothing to wait for.
            poller.stop();
        }
        self.configuration_store.clear();
    }

    /// Current configuration snapshot, if any.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        self.configuration_store.get_configuration()
    }

    /// Install a configuration, e.g. one delivered through an application-managed transport.
    /// Makes the client ready. Ignored after shutdown.
    pub fn set_configuration(&self, configuration: Configuration) {
        if self.lifecycle.current() == LifecycleState::Shutdown {
            return;
        }
        self.configuration_store
            .set_configuration(Arc::new(configuration));
        // A shutdown may have landed between the check above and the store write. Its clear()
        // can run before our write, so re-check and clear rather than leave a snapshot behind.
        if self.lifecycle.current() == LifecycleState::Shutdown {
            self.configuration_store.clear();
            return;
        }
        self.lifecycle.advance(LifecycleState::Ready);
    }

    /// Keys of all flags in the current configuration.
    pub fn get_flag_keys(&self) -> HashSet<String> {
        self.configuration_store
            .get_configuration()
            .map(|configuration| configuration.flag_keys())
            .unwrap_or_default()
    }

    /// Keys of bandits in the current configuration that have a resolvable model.
    pub fn get_bandit_keys(&self) -> HashSet<String> {
        self.configuration_store
            .get_configuration()
            .map(|configuration| configuration.bandit_keys())
            .unwrap_or_default()
    }

    /// Assignment for a string flag, or `default` if the subject gets no assignment.
    pub fn get_string_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: String,
    ) -> String {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::String,
            default,
            AssignmentValue::into_string,
        )
    }

    /// Assignment for an integer flag, or `default` if the subject gets no assignment.
    pub fn get_integer_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: i64,
    ) -> i64 {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Integer,
            default,
            |value| value.as_integer(),
        )
    }

    /// Assignment for a numeric flag, or `default` if the subject gets no assignment.
    pub fn get_numeric_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: f64,
    ) -> f64 {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Numeric,
            default,
            |value| value.as_numeric(),
        )
    }

    /// Assignment for a boolean flag, or `default` if the subject gets no assignment.
    pub fn get_boolean_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: bool,
    ) -> bool {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Boolean,
            default,
            |value| value.as_boolean(),
        )
    }

    /// Assignment for a JSON flag, or `default` if the subject gets no assignment.
    pub fn get_json_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: serde_json::Value,
    ) -> serde_json::Value {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Json,
            default,
            AssignmentValue::into_json,
        )
    }

    /// Like [`Client::get_string_assignment`], additionally reporting why the value was chosen.
    pub fn get_string_assignment_details(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: String,
    ) -> AssignmentDetails<String> {
        self.get_assignment_details_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::String,
            default,
            AssignmentValue::into_string,
        )
    }

    /// Like [`Client::get_integer_assignment`], additionally reporting why the value was chosen.
    pub fn get_integer_assignment_details(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: i64,
    ) -> AssignmentDetails<i64> {
        self.get_assignment_details_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Integer,
            default,
            |value| value.as_integer(),
        )
    }

    /// Like [`Client::get_numeric_assignment`], additionally reporting why the value was chosen.
    pub fn get_numeric_assignment_details(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: f64,
    ) -> AssignmentDetails<f64> {
        self.get_assignment_details_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Numeric,
            default,
            |value| value.as_numeric(),
        )
    }

    /// Like [`Client::get_boolean_assignment`], additionally reporting why the value was chosen.
    pub fn get_boolean_assignment_details(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: bool,
    ) -> AssignmentDetails<bool> {
        self.get_assignment_details_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Boolean,
            default,
            |value| value.as_boolean(),
        )
    }

    /// Like [`Client::get_json_assignment`], additionally reporting why the value was chosen.
    pub fn get_json_assignment_details(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: serde_json::Value,
    ) -> AssignmentDetails<serde_json::Value> {
        self.get_assignment_details_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Json,
            default,
            AssignmentValue::into_json,
        )
    }

    /// Evaluate the flag and, if the assigned variation activates a bandit, select an action
    /// for the subject among `actions`.
    ///
    /// Never fails: on any fallback the result carries `default_variation` and no action.
    /// Assignment and bandit events are delivered to the configured logger and also returned on
    /// the result.
    pub fn get_bandit_action(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &ContextAttributes,
        actions: &HashMap<String, ContextAttributes>,
        default_variation: &str,
    ) -> BanditResult {
        let configuration = self.configuration_store.get_configuration();
        let result = bandits::get_bandit_action(
            configuration.as_deref(),
            flag_key,
            subject_key,
            subject_attributes,
            actions,
            default_variation,
            Utc::now(),
        );
        if let Some(event) = &result.assignment_event {
            self.log_assignment_event(event.clone());
        }
        if let Some(event) = &result.bandit_event {
            self.log_bandit_event(event.clone());
        }
        result
    }

    fn get_assignment_inner<T>(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: VariationType,
        default: T,
        convert: impl FnOnce(AssignmentValue) -> Option<T>,
    ) -> T {
        self.get_assignment_details_inner(
            flag_key,
            subject_key,
            subject_attributes,
            expected_type,
            default,
            convert,
        )
        .value
    }

    fn get_assignment_details_inner<T>(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: VariationType,
        default: T,
        convert: impl FnOnce(AssignmentValue) -> Option<T>,
    ) -> AssignmentDetails<T> {
        let configuration = self.configuration_store.get_configuration();
        let subject_attributes = Arc::new(subject_attributes.clone());

        match evaluate_flag(
            configuration.as_deref(),
            flag_key,
            subject_key,
            &subject_attributes,
            Some(expected_type),
            Utc::now(),
        ) {
            Ok(assignment) => {
                if let Some(event) = assignment.event {
                    self.log_assignment_event(event);
                }
                match convert(assignment.value) {
                    Some(value) => AssignmentDetails {
                        value,
                        reason: EvaluationReason::Match,
                        allocation_key: Some(assignment.allocation_key),
                        variation_key: Some(assignment.variation_key),
                    },
                    // Unreachable: the variation type is checked during evaluation.
                    None => AssignmentDetails {
                        value: default,
                        reason: EvaluationReason::TypeMismatch,
                        allocation_key: None,
                        variation_key: None,
                    },
                }
            }
            Err(failure) => {
                if failure.is_normal() {
                    log::trace!(target: "switchyard",
                                flag_key,
                                subject_key;
                                "returning default assignment: {failure:?}");
                } else {
                    log::warn!(target: "switchyard",
                               flag_key,
                               subject_key;
                               "returning default assignment: {failure:?}");
                }
                AssignmentDetails {
                    value: default,
                    reason: failure.reason(),
                    allocation_key: None,
                    variation_key: None,
                }
            }
        }
    }

    fn log_assignment_event(&self, event: AssignmentEvent) {
        log::trace!(target: "switchyard", event:serde; "logging assignment");
        self.assignment_logger.log_assignment(event);
    }

    fn log_bandit_event(&self, event: BanditEvent) {
        log::trace!(target: "switchyard", event:serde; "logging bandit action");
        self.assignment_logger.log_bandit_action(event);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}
