//! Key file for authenticating to EventCall

use std::path::{Path, PathBuf};

/// The settings for the git-contents fallback store
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoreKeys {
    /// The root url of the content repo api (e.g. <https://api.github.com/repos/owner/repo>)
    pub root: String,
    /// The branch to read and write blobs on
    #[serde(default = "default_branch")]
    pub branch: String,
    /// The rotation pool of tokens to authenticate with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
}

/// Help serde default the content store branch to main
fn default_branch() -> String {
    "main".to_owned()
}

impl StoreKeys {
    /// Create a new [`StoreKeys`] object
    ///
    /// # Arguments
    ///
    /// * `root` - The root url of the content repo api
    pub fn new<R: Into<String>>(root: R) -> Self {
        StoreKeys {
            root: root.into(),
            branch: default_branch(),
            tokens: Vec::default(),
        }
    }

    /// Set the branch to read and write blobs on
    ///
    /// # Arguments
    ///
    /// * `branch` - The branch to use
    #[must_use]
    pub fn branch<B: Into<String>>(mut self, branch: B) -> Self {
        self.branch = branch.into();
        self
    }

    /// Add a token to the rotation pool
    ///
    /// # Arguments
    ///
    /// * `token` - The token to add
    #[must_use]
    pub fn token<T: Into<String>>(mut self, token: T) -> Self {
        self.tokens.push(token.into());
        self
    }
}

/// Auth keys for EventCall
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Keys {
    /// The url to reach the EventCall api at (must begin with http:// or https://)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// The username to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// The password to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// The settings for the fallback content store if one is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreKeys>,
}

impl Keys {
    /// Create a new auth Keys object
    ///
    /// # Arguments
    ///
    /// * `path` - The path to use when reading in the EventCall auth keys
    pub fn new(path: &str) -> Result<Self, config::ConfigError> {
        Self::from_path(PathBuf::from(path))
    }

    /// Create a new auth Keys object from a path
    ///
    /// # Arguments
    ///
    /// * `path` - The path to use when reading in the EventCall auth keys
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // load from a file first
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Yaml))
            // then overlay any environment args ontop
            .add_source(config::Environment::with_prefix("EVENTCALL_KEYS").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Create a new auth keys object from an API URL and a username/password
    ///
    /// # Arguments
    ///
    /// * `api` - The url of the EventCall api to talk too
    /// * `username` - The username to authenticate with
    /// * `password` - The password to authenticate with
    pub fn new_basic<A: Into<String>, U: Into<String>, P: Into<String>>(
        api: A,
        username: U,
        password: P,
    ) -> Self {
        Keys {
            api: Some(api.into()),
            username: Some(username.into()),
            password: Some(password.into()),
            store: None,
        }
    }

    /// Write these keys to a yaml file
    ///
    /// # Arguments
    ///
    /// * `path` - The path to write the keys to
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}
