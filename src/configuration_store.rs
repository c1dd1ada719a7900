//! A thread-safe in-memory home for [`Configuration`].
use std::sync::{Arc, RwLock};

use crate::Configuration;

/// Holds the currently-active configuration and allows concurrent readers while a background
/// writer swaps in updates.
///
/// Readers get an `Arc` snapshot, so a whole evaluation runs against one consistent
/// configuration even if an update lands midway.
#[derive(Default)]
pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigurationStore {
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Current configuration, or `None` if one has not been set yet.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        // Poisoning can only happen if a writer panicked, and writers only move an Arc, so the
        // stored value is still intact.
        match self.configuration.read() {
            Ok(configuration) => configuration.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the active configuration. Readers holding the previous snapshot are unaffected.
    pub fn set_configuration(&self, configuration: Arc<Configuration>) {
        self.update(Some(configuration));
    }

    /// Drop the active configuration. Used on shutdown.
    pub(crate) fn clear(&self) {
        self.update(None);
    }

    fn update(&self, configuration: Option<Arc<Configuration>>) {
        let mut lock = match self.configuration.write() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        *lock = configuration;
    }
}
