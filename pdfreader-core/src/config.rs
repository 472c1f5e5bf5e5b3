use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::viewport::{is_valid_scale, ViewportOptions};
use crate::visibility::DEFAULT_VISIBILITY_THRESHOLD;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub initial_scale: f32,
    pub visibility_threshold: f32,
    pub page_gap: f32,
    pub overscan: usize,
    pub zoom_step_percent: u32,
    pub render_cache_capacity: usize,
    pub sample_path: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            initial_scale: 1.0,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            page_gap: 16.0,
            overscan: 1,
            zoom_step_percent: 10,
            render_cache_capacity: 10,
            sample_path: None,
        }
    }
}

impl ViewerConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_scale(self.initial_scale) {
            return Err(ConfigError::Invalid(format!(
                "initial_scale {} is outside 0.25..=5",
                self.initial_scale
            )));
        }
        if !(self.visibility_threshold > 0.0 && self.visibility_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "visibility_threshold {} must be in (0, 1]",
                self.visibility_threshold
            )));
        }
        if !self.page_gap.is_finite() || self.page_gap < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "page_gap {} must be a non-negative number",
                self.page_gap
            )));
        }
        if self.zoom_step_percent == 0 {
            return Err(ConfigError::Invalid("zoom_step_percent must be positive".into()));
        }
        Ok(())
    }

    pub fn viewport_options(&self) -> ViewportOptions {
        ViewportOptions {
            page_gap: self.page_gap,
            overscan: self.overscan,
            visibility_threshold: self.visibility_threshold,
        }
    }
}

/// Per-user locations for config, persisted bookmarks and logs.
#[derive(Debug, Clone)]
pub struct ViewerPaths {
    pub config_file: PathBuf,
    pub bookmarks_file: PathBuf,
    pub log_dir: PathBuf,
}

impl ViewerPaths {
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("net", "pdfreader", "pdfreader")
            .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
        Ok(Self::under(dirs.config_dir(), dirs.data_local_dir()))
    }

    pub fn under(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            bookmarks_file: data_dir.join("state").join("bookmarks.json"),
            log_dir: data_dir.join("logs"),
        }
    }
}
