//! Transport layer that downloads configuration over HTTP.
use reqwest::{StatusCode, Url};

use crate::bandits::BanditResponse;
use crate::flags::FlagsConfig;
use crate::{Configuration, Error, Result};

/// Default configuration server.
pub const DEFAULT_BASE_URL: &str = "https://config.switchyard.dev/api";

const FLAGS_ENDPOINT: &str = "flag-config/v1/config";
const BANDITS_ENDPOINT: &str = "flag-config/v1/bandits";

#[derive(Debug, Clone)]
pub struct ConfigurationFetcherConfig {
    pub base_url: String,
    pub api_key: String,
    /// SDK name, attached to requests as a query parameter.
    pub sdk_name: String,
    /// SDK version, attached to requests as a query parameter.
    pub sdk_version: String,
}

/// Downloads configuration snapshots from the server.
///
/// The fetcher is synchronous and is normally driven by [`PollerThread`](crate::PollerThread).
pub struct ConfigurationFetcher {
    client: reqwest::blocking::Client,
    config: ConfigurationFetcherConfig,
    /// The server told us the API key is invalid. There is no point in retrying with the same
    /// key, so all subsequent fetches fail fast.
    unauthorized: bool,
}

impl ConfigurationFetcher {
    pub fn new(config: ConfigurationFetcherConfig) -> ConfigurationFetcher {
        ConfigurationFetcher {
            client: reqwest::blocking::Client::new(),
            config,
            unauthorized: false,
        }
    }

    /// Fetch the flags document and, when any flag references a bandit, the bandit models
    /// document as well.
    pub fn fetch_configuration(&mut self) -> Result<Configuration> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let flags = self.fetch_flags_configuration()?;

        let bandits = if flags.bandits.is_empty() {
            None
        } else {
            Some(self.fetch_bandits_configuration()?)
        };

        Ok(Configuration::from_server_response(flags, bandits))
    }

    fn fetch_flags_configuration(&mut self) -> Result<FlagsConfig> {
        log::debug!(target: "switchyard", "fetching flags configuration");
        let configuration = self.get(FLAGS_ENDPOINT)?.json()?;
        log::debug!(target: "switchyard", "fetched flags configuration");
        Ok(configuration)
    }

    fn fetch_bandits_configuration(&mut self) -> Result<BanditResponse> {
        log::debug!(target: "switchyard", "fetching bandits configuration");
        let configuration = self.get(BANDITS_ENDPOINT)?.json()?;
        log::debug!(target: "switchyard", "fetched bandits configuration");
        Ok(configuration)
    }

    fn get(&mut self, endpoint: &str) -> Result<reqwest::blocking::Response> {
        let url = Url::parse(&format!("{}/{}", self.config.base_url, endpoint))
            .map_err(Error::InvalidBaseUrl)?;

        let response = self
            .client
            .get(url)
            .query(&[
                ("apiKey", &*self.config.api_key),
                ("sdkName", &*self.config.sdk_name),
                ("sdkVersion", &*self.config.sdk_version),
            ])
            .send()?;

        if response.status() == StatusCode::UNAUTHORIZED {
            log::warn!(target: "switchyard", "server rejected the api key");
            self.unauthorized = true;
            return Err(Error::Unauthorized);
        }

        Ok(response.error_for_status()?)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigurationFetcher, ConfigurationFetcherConfig};
    use crate::Error;

    #[test]
    fn invalid_base_url_is_reported() {
        let mut fetcher = ConfigurationFetcher::new(ConfigurationFetcherConfig {
            base_url: "not a url".to_owned(),
            api_key: "key".to_owned(),
            sdk_name: "switchyard".to_owned(),
            sdk_version: "0.1.0".to_owned(),
        });
        assert!(matches!(
            fetcher.fetch_configuration().unwrap_err(),
            Error::InvalidBaseUrl(_)
        ));
    }
}
