//! Client configuration.
//!
//! Values are merged from built-in defaults, an optional TOML file and
//! `SELETIVO_*` environment variables, in increasing precedence.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, Map};
use seletivo_domain::{DEFAULT_MOCK_TOKEN_PREFIX, ExpiryPolicy, GuardPolicy};
use serde::Deserialize;
use url::Url;

use crate::auth::AuthEndpoints;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "seletivo";

const ENV_PREFIX: &str = "SELETIVO";

/// Errors raised while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A source could not be read or a value has the wrong type.
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// No storage secret was configured.
    #[error("storage_secret is not set (use SELETIVO_STORAGE_SECRET)")]
    MissingSecret,

    /// No storage path was configured and the platform has no data dir.
    #[error("storage_path is not set and no user data directory is available")]
    NoDataDir,
}

/// Settings for the session client.
#[derive(Clone, Deserialize)]
pub struct SessionSettings {
    /// REST API root.
    pub api_base_url: Url,
    /// Login endpoint, relative to the base URL.
    pub login_path: String,
    /// Token-exchange endpoint.
    pub refresh_path: String,
    /// Profile endpoint; `{id}` is substituted.
    pub profile_path: String,
    /// Route the guard redirects to.
    pub login_route: String,
    /// Encrypted credential file. Defaults to the user data directory.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// Passphrase the storage key is derived from.
    #[serde(default)]
    pub storage_secret: Option<String>,
    /// Bypass sentinel prefix; empty disables the check.
    pub mock_token_prefix: String,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
    /// Reject tokens without an expiry claim.
    pub require_expiry: bool,
}

impl SessionSettings {
    /// Loads settings from `file` (or `./seletivo.toml` if present) and
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is unreadable or a value is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_env(file, None)
    }

    /// Like [`Self::load`], reading environment variables from `env`
    /// instead of the process environment when given.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is unreadable or a value is invalid.
    pub fn load_with_env(
        file: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, SettingsError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .set_default("api_base_url", "http://localhost:8080")?
            .set_default("login_path", "/auth/login")?
            .set_default("refresh_path", "/auth/refresh")?
            .set_default("profile_path", "/users/{id}")?
            .set_default("login_route", "/login")?
            .set_default("mock_token_prefix", DEFAULT_MOCK_TOKEN_PREFIX)?
            .set_default("request_timeout_ms", 30_000)?
            .set_default("require_expiry", false)?
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Guard policy derived from these settings.
    #[must_use]
    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy {
            mock_token_prefix: self.mock_token_prefix.clone(),
            expiry: if self.require_expiry {
                ExpiryPolicy::RequireExpiry
            } else {
                ExpiryPolicy::Permissive
            },
        }
    }

    /// Auth endpoint paths.
    #[must_use]
    pub fn auth_endpoints(&self) -> AuthEndpoints {
        AuthEndpoints {
            login: self.login_path.clone(),
            refresh: self.refresh_path.clone(),
            profile: self.profile_path.clone(),
        }
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Storage secret, required to open the session file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::MissingSecret`] when unset or blank.
    pub fn storage_secret(&self) -> Result<&str, SettingsError> {
        self.storage_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(SettingsError::MissingSecret)
    }

    /// Resolved location of the session file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NoDataDir`] when no path is configured and
    /// the platform has no user data directory.
    pub fn storage_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.storage_path {
            Some(path) => Ok(path.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("seletivo").join("session.json"))
                .ok_or(SettingsError::NoDataDir),
        }
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("login_path", &self.login_path)
            .field("refresh_path", &self.refresh_path)
            .field("profile_path", &self.profile_path)
            .field("login_route", &self.login_route)
            .field("storage_path", &self.storage_path)
            .field("storage_secret", &self.storage_secret.as_ref().map(|_| "<redacted>"))
            .field("mock_token_prefix", &self.mock_token_prefix)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("require_expiry", &self.require_expiry)
            .finish()
    }
}
