use std::sync::Arc;

/// Result type used throughout the crate. The error variant is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can be returned to the caller.
///
/// Note that flag and bandit evaluation never returns an error: evaluation-time problems are
/// absorbed into the caller-supplied default value. `Error` covers construction-time validation,
/// configuration parsing, and transport/lifecycle failures.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// `api_key` is required and cannot be blank.
    #[error("invalid value for api_key: cannot be blank")]
    EmptyApiKey,

    /// Polling is disabled and no initial configuration was supplied, so the client has no way
    /// to ever obtain a configuration.
    #[error("either polling must be enabled or initial_configuration must be provided")]
    MissingConfigurationSource,

    /// `poll_interval` must be positive when polling is enabled.
    #[error("poll_interval must be positive")]
    InvalidPollInterval,

    /// An attribute value has an unsupported shape (nested array or object).
    #[error("attribute {key:?} has an unsupported value; only numbers, strings, booleans, and null are allowed")]
    InvalidAttribute {
        /// Key of the offending attribute.
        key: String,
    },

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// Configuration bytes failed to parse.
    #[error("error parsing configuration")]
    // serde_json::Error is not clonable, so it is wrapped in an Arc.
    ConfigurationParseError(#[source] Arc<serde_json::Error>),

    /// The server rejected the API key.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// The poller thread was stopped before it fetched a configuration.
    #[error("poller thread stopped before fetching a configuration")]
    PollerThreadStopped,

    /// The poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,

    /// An I/O error.
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::ConfigurationParseError(Arc::new(value))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
