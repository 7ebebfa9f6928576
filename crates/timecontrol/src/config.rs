//! Engine configuration: safety cap and default time control.
//!
//! Loaded from YAML and/or the environment. The safety options also live in a
//! process-wide registry so the factory can apply them without threading a
//! config value through every call site.

use crate::factory::TimeControl;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};
use thiserror::Error;

/// Environment variable holding the safety cap in milliseconds.
pub const ENV_MAX_CAP_MS: &str = "TIMECONTROL_MAX_CAP_MS";
/// Environment variable pointing at a YAML config file.
pub const ENV_CONFIG_PATH: &str = "TIMECONTROL_CONFIG_PATH";

/// Largest integer exactly representable as an IEEE-754 double.
pub const SAFE_INTEGER_MAX_MS: u64 = (1 << 53) - 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{var}={value:?} is not a millisecond count")]
    Env { var: &'static str, value: String },
}

/// Process-level bounds applied to every pair the factory builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyOptions {
    /// Upper bound for increment-family clocks. Lowers an unset or larger `max_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cap_ms: Option<u64>,
}

impl SafetyOptions {
    pub const fn capped(max_cap_ms: u64) -> Self {
        Self { max_cap_ms: Some(max_cap_ms) }
    }

    /// Cap bounded to the range downstream storage can hold exactly.
    pub const fn safe_integer() -> Self {
        Self::capped(SAFE_INTEGER_MAX_MS)
    }

    /// Effective maximum for a family requesting `max_ms`.
    pub fn cap_max(&self, max_ms: Option<u64>) -> Option<u64> {
        match (max_ms, self.max_cap_ms) {
            (Some(max), Some(cap)) => Some(max.min(cap)),
            (None, cap) => cap,
            (max, None) => max,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub safety: SafetyOptions,
    /// Time control used when a match does not specify one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_control: Option<TimeControl>,
}

impl EngineConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load_from_yaml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&raw)
    }

    /// Build from variables: the file named by [`ENV_CONFIG_PATH`] first, then
    /// [`ENV_MAX_CAP_MS`] on top.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(ENV_CONFIG_PATH) {
            Some(path) if !path.trim().is_empty() => Self::load_from_yaml_path(path.trim())?,
            _ => Self::default(),
        };
        if let Some(raw) = lookup(ENV_MAX_CAP_MS) {
            let cap = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Env { var: ENV_MAX_CAP_MS, value: raw.clone() })?;
            config.safety.max_cap_ms = Some(cap);
        }
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Make this config's safety options the process default.
    pub fn install(&self) {
        set_process_safety(self.safety);
    }
}

static PROCESS_SAFETY: OnceLock<RwLock<SafetyOptions>> = OnceLock::new();

/// Current process-wide safety options.
pub fn process_safety() -> SafetyOptions {
    let lock = PROCESS_SAFETY.get_or_init(|| RwLock::new(SafetyOptions::default()));
    *lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Swap the process-wide safety options.
pub fn set_process_safety(options: SafetyOptions) {
    let lock = PROCESS_SAFETY.get_or_init(|| RwLock::new(SafetyOptions::default()));
    *lock.write().unwrap_or_else(std::sync::PoisonError::into_inner) = options;
}
