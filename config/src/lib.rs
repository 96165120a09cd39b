//! Configuration for Pledge.
//!
//! ```toml
//! [scheduler]
//! max_jobs_per_drain = 100000
//!
//! [resolution]
//! max_depth = 1024
//!
//! [diagnostics]
//! unhandled_rejections = "warn"
//! max_retained = 256
//! ```
//!
//! Every section is optional. Effective values come from the accessor methods,
//! which apply the defaults below when a key is absent.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default cap on nested thenable resolution.
pub const DEFAULT_MAX_RESOLUTION_DEPTH: u32 = 1024;

/// Default cap on jobs run by a single drain.
pub const DEFAULT_MAX_JOBS_PER_DRAIN: usize = 1_000_000;

/// Default cap on unhandled rejections a queue keeps for `take_unhandled_rejections`.
pub const DEFAULT_MAX_RETAINED_REJECTIONS: usize = 256;

#[derive(Debug, Default, Deserialize)]
pub struct PledgeConfig {
    pub scheduler: Option<SchedulerConfig>,
    pub resolution: Option<ResolutionConfig>,
    pub diagnostics: Option<DiagnosticsConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SchedulerConfig {
    /// Stop a drain after this many jobs. Remaining jobs stay queued.
    pub max_jobs_per_drain: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolutionConfig {
    /// Nesting limit for thenables resolving with thenables. Exceeding it
    /// rejects with a `RangeError` instead of recursing further.
    pub max_depth: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default)]
    pub unhandled_rejections: UnhandledRejectionMode,
    /// Keep at most this many reported rejections; the oldest are dropped first.
    pub max_retained: Option<usize>,
}

/// What to do with rejections nobody observed by the end of a drain.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledRejectionMode {
    /// Discard them.
    Ignore,
    /// Emit a `tracing` warning and keep them for `take_unhandled_rejections`.
    #[default]
    Warn,
}

impl UnhandledRejectionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Warn => "warn",
        }
    }
}

impl PledgeConfig {
    /// Load `~/.pledge/config.toml`. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn max_jobs_per_drain(&self) -> usize {
        self.scheduler
            .as_ref()
            .and_then(|s| s.max_jobs_per_drain)
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_JOBS_PER_DRAIN)
    }

    #[must_use]
    pub fn max_resolution_depth(&self) -> u32 {
        self.resolution
            .as_ref()
            .and_then(|r| r.max_depth)
            .unwrap_or(DEFAULT_MAX_RESOLUTION_DEPTH)
    }

    #[must_use]
    pub fn unhandled_rejections(&self) -> UnhandledRejectionMode {
        self.diagnostics
            .as_ref()
            .map(|d| d.unhandled_rejections)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn max_retained_rejections(&self) -> usize {
        self.diagnostics
            .as_ref()
            .and_then(|d| d.max_retained)
            .unwrap_or(DEFAULT_MAX_RETAINED_REJECTIONS)
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pledge").join("config.toml"))
}
