//! Environment-driven settings.
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file. Required credentials are checked by [`Settings::validate`]
//! so that commands which never authenticate (e.g. listing scenarios) work
//! without them.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use parking_lot::RwLock;
use scoreload_application::ports::SettingsSource;
use scoreload_domain::AuthSettings;
use thiserror::Error;
use tracing::info;
use url::Url;

/// Environment variable names.
pub mod keys {
    /// Base URL of the target API
    pub const API_HOST: &str = "API_HOST";
    /// OAuth2 client id
    pub const CLIENT_ID: &str = "CLIENT_ID";
    /// OAuth2 client secret
    pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
    /// Space-separated scopes
    pub const SCOPE: &str = "SCOPE";
    /// Token endpoint path
    pub const AUTH_ENDPOINT: &str = "AUTH_ENDPOINT";
    /// Token lifetime used when the provider omits one
    pub const DEFAULT_TOKEN_EXPIRY: &str = "DEFAULT_TOKEN_EXPIRY";
    /// Seconds before expiry at which tokens are refreshed
    pub const TOKEN_REFRESH_BUFFER: &str = "TOKEN_REFRESH_BUFFER";
    /// Per-request timeout in seconds
    pub const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
}

/// Staging API used when `API_HOST` is not set.
pub const DEFAULT_API_HOST: &str = "https://www.staging.scorebuddy.co.uk/1777161849/api/v1";

/// Every scope the load scenarios need.
pub const DEFAULT_SCOPE: &str = "staff:read staff:write staff:delete \
users:read users:write users:delete \
teams:read teams:write teams:delete \
groups:read groups:write groups:delete \
scores:read \
scorecards:read \
integrations:read integrations:write integrations:delete";

/// Request timeout used when `REQUEST_TIMEOUT_SECS` is not set.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors raised while loading or validating settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Required variables are unset or empty.
    #[error(
        "missing required environment variables: {}\n\
         Create a .env file or export:\n  \
         API_HOST=your_api_host\n  \
         CLIENT_ID=your_client_id\n  \
         CLIENT_SECRET=your_client_secret",
        .0.join(", ")
    )]
    Missing(Vec<&'static str>),

    /// A numeric variable did not parse.
    #[error("{name} must be a whole number, got {value:?}")]
    InvalidNumber {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },

    /// The API host is not an absolute http(s) URL.
    #[error("API host {value:?} is not a valid http(s) URL: {reason}")]
    InvalidHost {
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A `.env` file could not be read.
    #[error("failed to load {path}: {message}")]
    EnvFile {
        /// File that failed
        path: String,
        /// Loader message
        message: String,
    },
}

/// Loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Authentication settings handed to the token cache
    pub auth: AuthSettings,
    /// Per-request timeout for load requests
    pub request_timeout: Duration,
}

impl Settings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`, applying defaults for unset values.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut auth = AuthSettings::new(
            get(keys::API_HOST).unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
            get(keys::CLIENT_ID).unwrap_or_default(),
            get(keys::CLIENT_SECRET).unwrap_or_default(),
            get(keys::SCOPE).unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
        );
        if let Some(endpoint) = get(keys::AUTH_ENDPOINT) {
            auth.auth_endpoint = endpoint;
        }
        auth.default_token_expiry_secs = parse_number(
            keys::DEFAULT_TOKEN_EXPIRY,
            get(keys::DEFAULT_TOKEN_EXPIRY),
            AuthSettings::DEFAULT_TOKEN_EXPIRY_SECS,
        )?;
        auth.refresh_buffer_secs = parse_number(
            keys::TOKEN_REFRESH_BUFFER,
            get(keys::TOKEN_REFRESH_BUFFER),
            AuthSettings::DEFAULT_REFRESH_BUFFER_SECS,
        )?;
        let timeout_secs = parse_number(
            keys::REQUEST_TIMEOUT_SECS,
            get(keys::REQUEST_TIMEOUT_SECS),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        Ok(Self {
            auth,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Replaces the API host, e.g. from a `--host` flag.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.auth.api_host = host.into();
        self
    }

    /// Checks that credentials are present and the host is usable.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Missing` listing every missing variable, or
    /// `SettingsError::InvalidHost`.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let missing: Vec<&'static str> = [
            (keys::API_HOST, &self.auth.api_host),
            (keys::CLIENT_ID, &self.auth.client_id),
            (keys::CLIENT_SECRET, &self.auth.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();
        if !missing.is_empty() {
            return Err(SettingsError::Missing(missing));
        }

        let host = &self.auth.api_host;
        let url = Url::parse(host).map_err(|e| SettingsError::InvalidHost {
            value: host.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SettingsError::InvalidHost {
                value: host.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, SettingsError> {
    raw.map_or(Ok(default), |value| {
        value
            .parse()
            .map_err(|_| SettingsError::InvalidNumber { name, value })
    })
}

/// Loads a `.env` file into the process environment.
///
/// With an explicit `path` the file must exist. Without one, a `.env` in
/// the working directory or its parents is used if present. Variables that
/// are already set are not overridden. Returns the file that was loaded.
///
/// # Errors
///
/// Returns `SettingsError::EnvFile` if the file is missing (explicit path
/// only) or malformed.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>, SettingsError> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path)
            .map(|()| Some(path.to_path_buf()))
            .map_err(|e| SettingsError::EnvFile {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(SettingsError::EnvFile {
                path: ".env".to_string(),
                message: e.to_string(),
            }),
        },
    }?;

    if let Some(file) = &loaded {
        info!(path = %file.display(), "Loaded environment file");
    }
    Ok(loaded)
}

/// Settings shared between the CLI and the token cache.
///
/// Replacing the settings at runtime changes the identity the cache sees,
/// which makes it discard its token on the next call.
#[derive(Debug)]
pub struct SharedSettings {
    inner: RwLock<Settings>,
}

impl SharedSettings {
    /// Wraps loaded settings.
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    /// A copy of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }

    /// Replaces the settings after validating them.
    ///
    /// # Errors
    ///
    /// Returns the validation error and keeps the old settings.
    pub fn replace(&self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        *self.inner.write() = settings;
        Ok(())
    }
}

impl SettingsSource for SharedSettings {
    fn auth_settings(&self) -> AuthSettings {
        self.inner.read().auth.clone()
    }
}
