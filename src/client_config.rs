use std::time::Duration;

use crate::assignment_logger::{AssignmentLogger, NoopAssignmentLogger};
use crate::configuration_fetcher::DEFAULT_BASE_URL;
use crate::poller::PollerThreadConfig;
use crate::{Configuration, Error, Result};

/// Configuration for [`Client`](crate::Client), built with chained setters:
///
/// ```
/// # use switchyard::ClientConfig;
/// let config = ClientConfig::from_api_key("api-key")
///     .poll_interval(Some(std::time::Duration::from_secs(60)));
/// ```
pub struct ClientConfig {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) assignment_logger: Box<dyn AssignmentLogger + Send + Sync>,
    /// `None` disables polling entirely.
    pub(crate) poll_interval: Option<Duration>,
    pub(crate) poll_jitter: Duration,
    pub(crate) initial_configuration: Option<Configuration>,
}

impl ClientConfig {
    /// Create a configuration with the given API key and all other settings at their defaults.
    pub fn from_api_key(api_key: impl Into<String>) -> ClientConfig {
        ClientConfig {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            assignment_logger: Box::new(NoopAssignmentLogger),
            poll_interval: Some(PollerThreadConfig::DEFAULT_POLL_INTERVAL),
            poll_jitter: PollerThreadConfig::DEFAULT_POLL_JITTER,
            initial_configuration: None,
        }
    }

    /// Override the configuration server base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> ClientConfig {
        self.base_url = base_url.into();
        self
    }

    /// Set the logger that receives assignment and bandit events.
    pub fn assignment_logger(
        mut self,
        logger: impl AssignmentLogger + Send + Sync + 'static,
    ) -> ClientConfig {
        self.assignment_logger = Box::new(logger);
        self
    }

    /// Set the interval between configuration fetches, or `None` to disable polling. With
    /// polling disabled, configuration must come from
    /// [`initial_configuration`](ClientConfig::initial_configuration) or
    /// [`Client::set_configuration`](crate::Client::set_configuration).
    pub fn poll_interval(mut self, interval: Option<Duration>) -> ClientConfig {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum random amount subtracted from the poll interval each cycle.
    pub fn poll_jitter(mut self, jitter: Duration) -> ClientConfig {
        self.poll_jitter = jitter;
        self
    }

    /// Seed the client with a configuration so it is ready to serve assignments immediately,
    /// before the first fetch completes.
    pub fn initial_configuration(mut self, configuration: Configuration) -> ClientConfig {
        self.initial_configuration = Some(configuration);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::EmptyApiKey);
        }
        if self.poll_interval.is_none() && self.initial_configuration.is_none() {
            // Nothing would ever produce a configuration; set_configuration alone is not a
            // plausible setup for a client constructed this way.
            return Err(Error::MissingConfigurationSource);
        }
        if matches!(self.poll_interval, Some(interval) if interval.is_zero()) {
            return Err(Error::InvalidPollInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ClientConfig;
    use crate::Error;

    #[test]
    fn blank_api_key_is_rejected() {
        for key in ["", "   "] {
            assert!(matches!(
                ClientConfig::from_api_key(key).validate().unwrap_err(),
                Error::EmptyApiKey
            ));
        }
    }

    #[test]
    fn polling_disabled_requires_initial_configuration() {
        let config = ClientConfig::from_api_key("key").poll_interval(None);
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::MissingConfigurationSource
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = ClientConfig::from_api_key("key").poll_interval(Some(Duration::ZERO));
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::InvalidPollInterval
        ));
    }

    #[test]
    fn defaults_validate() {
        assert!(ClientConfig::from_api_key("key").validate().is_ok());
    }
}
