//! Client settings for EventCall

use std::path::Path;

use super::transport::RetryPolicy;
use super::Keys;
use crate::Error;

/// Help serde default our timeout to 30 seconds
fn default_client_timeout() -> u64 {
    30
}

/// The config options for our [`reqwest::Client`] and retry behavior
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientSettings {
    /// The number of seconds to wait before timing out a single request
    #[serde(default = "default_client_timeout")]
    pub timeout: u64,
    /// The retry policy for requests that fail transiently
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    /// Default client settings to a sane default
    fn default() -> Self {
        ClientSettings {
            timeout: default_client_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A config for the EventCall client
///
/// This carries the auth keys plus the client settings and can be loaded from
/// a yaml file with environment overlays.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConf {
    /// The settings tied to talking to the API and the content store
    pub keys: Keys,
    /// The settings for the http client
    #[serde(default)]
    pub client: ClientSettings,
}

impl ClientConf {
    /// Create a new [`ClientConf`] from the given [`Keys`]
    ///
    /// # Arguments
    ///
    /// * `keys` - The EventCall keys to set
    #[must_use]
    pub fn new(keys: Keys) -> Self {
        ClientConf {
            keys,
            client: ClientSettings::default(),
        }
    }

    /// Check if our api url ends in '/api' and trim it if needed
    ///
    /// The api prefix is appended per route so a configured url that already
    /// carries it would double it.
    fn fix_api_url(&mut self) {
        if let Some(api) = &self.keys.api {
            if api.ends_with("/api") {
                // remove the /api from our config
                let trimmed = api.trim_end_matches("/api");
                // update the api url in our config
                self.keys.api = Some(trimmed.to_owned());
            }
        }
    }

    /// Loads a [`ClientConf`] from the given path
    ///
    /// # Arguments
    ///
    /// * `path` - The path to load this config from
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        // get the path to our config
        let path = path.as_ref();
        // build the EventCall config
        let mut config: ClientConf = config::Config::builder()
            // load from a file first
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            // then overlay any environment args on top
            .add_source(config::Environment::with_prefix("EVENTCALL").separator("__"))
            .build()?
            .try_deserialize()?;
        // fix our config if needed
        config.fix_api_url();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_api_is_trimmed() {
        // a configured url that already ends in /api gets trimmed
        let keys = Keys::new_basic("https://call.example.com/api", "alice", "hunter2");
        let mut conf = ClientConf::new(keys);
        conf.fix_api_url();
        assert_eq!(conf.keys.api.as_deref(), Some("https://call.example.com"));
    }
}
