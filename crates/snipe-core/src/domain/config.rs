//! Configuration: a named, reusable set of outbound request headers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::errors::ValidationError;
use super::ids::ConfigId;

/// Header key -> value. Opaque to the core; passed through to the call as-is.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: ConfigId,
    /// Unique across all configurations.
    pub name: String,
    pub headers: Headers,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConfiguration {
    pub name: String,
    #[serde(default)]
    pub headers: Headers,
}

impl NewConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Headers::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub headers: Option<Headers>,
}

impl ConfigPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.name {
            Some(name) if name.trim().is_empty() => Err(ValidationError::EmptyName),
            _ => Ok(()),
        }
    }

    pub fn apply(&self, config: &mut Configuration) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(headers) = &self.headers {
            config.headers = headers.clone();
        }
    }
}
