use std::{fs, time::Duration};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::{ClientResult, ErrorContext};

pub const ENV_API_BASE_URL: &str = "API_BASE_URL";
pub const ENV_DEFAULT_COOKIE: &str = "DEFAULT_COOKIE";

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    #[serde(default)]
    pub api: Api,
    #[validate(nested)]
    #[serde(default)]
    pub auth: AuthPolicy,
    #[serde(default)]
    pub session: Session,
    #[validate(nested)]
    pub log: Option<Log>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> ClientResult<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path)
            .with_context(&format!("Unable to read conf file from {path}"))?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config entry point: optional file, then environment overrides
    pub fn load(path: Option<&str>) -> ClientResult<Self> {
        let mut conf = match path {
            Some(path) => Self::load_from_yaml(path)?,
            None => Self::default(),
        };
        conf.merge_with_env(|key| std::env::var(key).ok());
        conf.validate().with_context("Conf validation failed")?;
        Ok(conf)
    }

    pub fn from_yaml(conf_str: &str) -> ClientResult<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).with_context("Unable to parse yaml conf")?;

        trace!("Loaded conf: {conf:?}");

        conf.validate().with_context("Conf validation failed")?;

        Ok(conf)
    }

    /// Apply deployment overrides; `lookup` resolves an environment variable.
    pub fn merge_with_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            debug!("Base URL overridden by {ENV_API_BASE_URL}");
            self.api.base_url = base_url;
        }
        if let Some(cookie) = lookup(ENV_DEFAULT_COOKIE).filter(|v| !v.trim().is_empty()) {
            self.session.default_cookie = cookie;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Api {
    #[serde(default = "Api::default_base_url")]
    #[validate(custom(function = "validate_base_url"))]
    pub base_url: String,
    #[serde(default = "Api::default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    #[serde(default = "Api::default_auth_check_timeout_ms")]
    #[validate(range(min = 1))]
    pub auth_check_timeout_ms: u64,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout_ms: Self::default_timeout_ms(),
            auth_check_timeout_ms: Self::default_auth_check_timeout_ms(),
        }
    }
}

impl Api {
    fn default_base_url() -> String {
        "http://localhost:3000".to_string()
    }

    fn default_timeout_ms() -> u64 {
        30_000
    }

    fn default_auth_check_timeout_ms() -> u64 {
        5_000
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn auth_check_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_check_timeout_ms)
    }

    /// Absolute URL of a backend endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn validate_base_url(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_base_url");
        err.add_param("url".into(), &url.to_string());
        Err(err)
    }
}

/// How long to wait for a refreshed session token after re-authentication
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct AuthPolicy {
    #[serde(default = "AuthPolicy::default_poll_interval_ms")]
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,
    #[serde(default = "AuthPolicy::default_max_poll_attempts")]
    #[validate(range(min = 1))]
    pub max_poll_attempts: u32,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval_ms(),
            max_poll_attempts: Self::default_max_poll_attempts(),
        }
    }
}

impl AuthPolicy {
    fn default_poll_interval_ms() -> u64 {
        100
    }

    fn default_max_poll_attempts() -> u32 {
        100
    }

    /// Ceiling for the token-change wait: attempts × interval, saturating
    pub fn token_wait(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).saturating_mul(self.max_poll_attempts)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub default_cookie: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Session {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}

// keep secrets out of trace logs
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("default_cookie", &"<redacted>")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Log {
    #[validate(length(min = 1))]
    pub path: String,
}
