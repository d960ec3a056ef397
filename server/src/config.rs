//! Process configuration.
//!
//! Values come from the environment, optionally preloaded from a dotenv file.
//! `Configuration::validate` checks presence of required keys before anything
//! else runs; `ServerSettings::from_config` derives typed settings.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use db::Credentials;
use thiserror::Error;

use crate::fetch::RemoteSchemaLocator;

/// Configuration key names.
pub mod keys {
    pub const DB_URI: &str = "DB_URI";
    pub const DB_USER: &str = "DB_USER";
    pub const DB_PASS: &str = "DB_PASS";
    pub const DB_GRAPH: &str = "DB_GRAPH";
    pub const PORT: &str = "PORT";
    pub const HOST: &str = "HOST";
    pub const PRODUCTION: &str = "PRODUCTION";
    pub const SCHEMA_REPO_OWNER: &str = "SCHEMA_REPO_OWNER";
    pub const SCHEMA_REPO_NAME: &str = "SCHEMA_REPO_NAME";
    pub const SCHEMA_FILE_PATH: &str = "SCHEMA_FILE_PATH";
    pub const SCHEMA_REPO_TOKEN: &str = "SCHEMA_REPO_TOKEN";
    pub const SCHEMA_REPO_REF: &str = "SCHEMA_REPO_REF";
    pub const SCHEMA_API_URL: &str = "SCHEMA_API_URL";
    pub const SCHEMA_LOCAL_DIR: &str = "SCHEMA_LOCAL_DIR";
    pub const DRAIN_TIMEOUT_SECS: &str = "DRAIN_TIMEOUT_SECS";
}

/// Keys `serve` cannot start without.
pub const SERVE_REQUIRED_KEYS: &[&str] = &[
    keys::DB_URI,
    keys::DB_USER,
    keys::DB_PASS,
    keys::PORT,
    keys::SCHEMA_REPO_OWNER,
    keys::SCHEMA_REPO_NAME,
    keys::SCHEMA_FILE_PATH,
    keys::SCHEMA_REPO_TOKEN,
    keys::PRODUCTION,
];

/// Keys `print-schema` cannot run without.
pub const PRINT_SCHEMA_REQUIRED_KEYS: &[&str] = &[
    keys::SCHEMA_REPO_OWNER,
    keys::SCHEMA_REPO_NAME,
    keys::SCHEMA_FILE_PATH,
    keys::SCHEMA_REPO_TOKEN,
];

const SECRET_KEYS: &[&str] = &[keys::DB_PASS, keys::SCHEMA_REPO_TOKEN];

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", keys.join(", "))]
    Missing { keys: Vec<String> },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load env file '{path}': {message}")]
    EnvFile { path: String, message: String },
}

/// Immutable snapshot of named string values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Snapshot of the process environment. Non-UTF-8 entries are skipped.
    pub fn from_env() -> Self {
        Self::from_pairs(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    /// Load a dotenv file into the environment, then snapshot it.
    ///
    /// An explicit `env_file` must exist; otherwise `.env` is loaded when
    /// present. Variables already set in the environment win.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            }
            None => {
                if let Ok(path) = dotenvy::dotenv() {
                    tracing::debug!(path = %path.display(), "loaded environment file");
                }
            }
        }
        Ok(Self::from_env())
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Value of `key`, treating empty and whitespace-only values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Confirms every `required` key is present and non-empty.
    ///
    /// Reports all missing keys at once, in the order given.
    pub fn validate(&self, required: &[&str]) -> Result<&Self, ConfigError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|key| self.get(key).is_none())
            .map(|key| key.to_string())
            .collect();

        if missing.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Missing { keys: missing })
        }
    }

    fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing {
            keys: vec![key.to_string()],
        })
    }

    /// The remote schema location described by the `SCHEMA_*` keys.
    pub fn locator(&self) -> Result<RemoteSchemaLocator, ConfigError> {
        let mut locator = RemoteSchemaLocator::new(
            self.require(keys::SCHEMA_REPO_OWNER)?,
            self.require(keys::SCHEMA_REPO_NAME)?,
            self.require(keys::SCHEMA_FILE_PATH)?,
            self.require(keys::SCHEMA_REPO_TOKEN)?,
        );
        if let Some(git_ref) = self.get(keys::SCHEMA_REPO_REF) {
            locator = locator.with_ref(git_ref);
        }
        if let Some(api_url) = self.get(keys::SCHEMA_API_URL) {
            locator = locator.with_api_url(api_url);
        }
        Ok(locator)
    }

    /// Directory of local `*.graphql` files merged with the remote schema.
    pub fn local_schema_dir(&self) -> Option<PathBuf> {
        self.get(keys::SCHEMA_LOCAL_DIR).map(PathBuf::from)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if SECRET_KEYS.contains(&key.as_str()) {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub uri: String,
    pub credentials: Credentials,
    pub graph_name: Option<String>,
}

/// Typed settings for `serve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub database: DatabaseSettings,
    pub listen: SocketAddr,
    pub locator: RemoteSchemaLocator,
    pub local_schema_dir: Option<PathBuf>,
    pub introspection: bool,
    pub drain_timeout: Duration,
}

impl ServerSettings {
    pub fn from_config(config: &Configuration) -> Result<Self, ConfigError> {
        config.validate(SERVE_REQUIRED_KEYS)?;

        let port = parse_port(config.require(keys::PORT)?)?;
        let host = config.get(keys::HOST).unwrap_or(DEFAULT_HOST);
        let host: IpAddr = host.parse().map_err(|e| ConfigError::Invalid {
            key: keys::HOST.to_string(),
            value: host.to_string(),
            reason: format!("{}", e),
        })?;

        let drain_timeout = match config.get(keys::DRAIN_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: keys::DRAIN_TIMEOUT_SECS.to_string(),
                value: raw.to_string(),
                reason: format!("{}", e),
            })?),
            None => DEFAULT_DRAIN_TIMEOUT,
        };

        Ok(Self {
            database: DatabaseSettings {
                uri: config.require(keys::DB_URI)?.to_string(),
                credentials: Credentials::new(
                    config.require(keys::DB_USER)?,
                    config.require(keys::DB_PASS)?,
                ),
                graph_name: config.get(keys::DB_GRAPH).map(str::to_string),
            },
            listen: SocketAddr::new(host, port),
            locator: config.locator()?,
            local_schema_dir: config.local_schema_dir(),
            introspection: introspection_enabled(config.require(keys::PRODUCTION)?),
            drain_timeout,
        })
    }
}

/// Introspection is on only when the production flag is exactly `"FALSE"`.
pub fn introspection_enabled(production_flag: &str) -> bool {
    production_flag == "FALSE"
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
        key: keys::PORT.to_string(),
        value: raw.to_string(),
        reason: format!("{}", e),
    })
}
