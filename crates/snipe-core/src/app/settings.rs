//! Settings - TOML-backed runtime configuration.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//! Environment overrides are applied after parsing:
//! - `SNIPE_LOG`: `log_level`
//! - `SNIPE_HTTP_BASE_URL`: `http.base_url`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::{TaskBounds, TaskDefaults};
use crate::impls::live_hub::DEFAULT_CHANNEL_CAPACITY;

pub const LOG_ENV: &str = "SNIPE_LOG";
pub const BASE_URL_ENV: &str = "SNIPE_HTTP_BASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("reading settings file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// tracing filter directive, e.g. `info` or `snipe_core=debug`.
    pub log_level: Option<String>,
    pub task_defaults: TaskDefaults,
    pub bounds: TaskBounds,
    pub live_update: LiveUpdateSettings,
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: None,
            task_defaults: TaskDefaults::default(),
            bounds: TaskBounds::default(),
            live_update: LiveUpdateSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveUpdateSettings {
    /// Per-task buffer; slower subscribers skip ahead.
    pub channel_capacity: usize,
}

impl Default for LiveUpdateSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Shape of the outbound redeem request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub base_url: String,
    pub redeem_path: String,
    pub timeout_secs: u64,
    /// Boolean field of a 200 response body that marks success.
    pub success_field: String,
    /// Request body field that carries the redeem target.
    pub target_field: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            redeem_path: "/redeem".to_string(),
            timeout_secs: 30,
            success_field: "success".to_string(),
            target_field: "target".to_string(),
        }
    }
}

impl HttpSettings {
    pub fn redeem_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.redeem_path.trim_start_matches('/')
        )
    }
}

impl Settings {
    /// Parse and validate. No environment overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read `path`, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings = toml::from_str(&contents)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        tracing::debug!(?path, "settings loaded");
        Ok(settings)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_level = Some(level);
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.http.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let d = &self.task_defaults;
        self.bounds
            .check(d.network_compensation_ms, d.max_retries, d.retry_interval_ms)
            .map_err(|e| SettingsError::Invalid(format!("task_defaults: {e}")))?;

        if self.live_update.channel_capacity == 0 {
            return Err(SettingsError::Invalid(
                "live_update.channel_capacity must be > 0".into(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(SettingsError::Invalid("http.timeout_secs must be > 0".into()));
        }
        if self.http.target_field.is_empty() || self.http.success_field.is_empty() {
            return Err(SettingsError::Invalid(
                "http.target_field and http.success_field must be non-empty".into(),
            ));
        }
        Ok(())
    }
}
