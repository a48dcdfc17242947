//! Runtime configuration loaded from JSON.

use crate::feature::definition::is_valid_feature_id;
use crate::logging::{default_log_level, normalize_level, normalize_log_dir, LoggingConfig};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Upper bound on delivery rounds per `run_until_idle` call.
pub const DEFAULT_MAX_DELIVERY_ROUNDS: usize = 64;

/// Tunables for one [`crate::Runtime`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    /// Feature ids that never activate.
    pub disabled_features: Vec<String>,
    pub max_delivery_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            disabled_features: Vec::new(),
            max_delivery_rounds: DEFAULT_MAX_DELIVERY_ROUNDS,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "malformed config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl RuntimeConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.log_level).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if let Some(dir) = &self.log_dir {
            normalize_log_dir(dir).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        if self.max_delivery_rounds == 0 {
            return Err(ConfigError::Invalid(
                "max_delivery_rounds must be at least 1".to_string(),
            ));
        }
        if let Some(id) = self
            .disabled_features
            .iter()
            .find(|id| !is_valid_feature_id(id))
        {
            return Err(ConfigError::Invalid(format!(
                "disabled_features contains invalid id `{id}`"
            )));
        }
        Ok(())
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}
