//! Viewer configuration (JSON).
//!
//! Every field is optional; a missing file section falls back to the stock
//! tunables: three OBJ models under `models/`, refreshed every 30 seconds,
//! scattered within 5 units of the origin on the ground plane.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, CatalogEntry, CatalogError};
use crate::pipeline::{LoadSettings, Placement};

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid catalog: {0}")]
    Catalog(#[from] CatalogError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Scatter bounds for placed assets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterConfig {
    /// Width of the square placement area centred on the origin
    pub range: f32,
    /// Height every asset is placed at
    pub y: f32,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self { range: 5.0, y: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub asset_root: PathBuf,
    pub refresh_interval_ms: u64,
    /// Per-candidate decode limit; `None` waits indefinitely
    pub candidate_timeout_ms: Option<u64>,
    pub scatter: ScatterConfig,
    pub models: Vec<CatalogEntry>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("models"),
            refresh_interval_ms: 30_000,
            candidate_timeout_ms: None,
            scatter: ScatterConfig::default(),
            models: (1..=3)
                .map(|i| CatalogEntry::new(format!("model{}", i), &["obj"]))
                .collect(),
        }
    }
}

impl ViewerConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid("refresh_interval_ms must be positive".into()));
        }
        if self.candidate_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("candidate_timeout_ms must be positive".into()));
        }
        if !self.scatter.range.is_finite() || self.scatter.range < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "scatter.range must be a non-negative number, got {}",
                self.scatter.range
            )));
        }
        if !self.scatter.y.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "scatter.y must be finite, got {}",
                self.scatter.y
            )));
        }
        Ok(())
    }

    /// Build the asset catalog from `models`.
    pub fn catalog(&self) -> ConfigResult<Catalog> {
        Ok(Catalog::from_entries(&self.models)?)
    }

    pub fn load_settings(&self) -> LoadSettings {
        LoadSettings {
            asset_root: self.asset_root.clone(),
            placement: Placement {
                range: self.scatter.range,
                y: self.scatter.y,
            },
            candidate_timeout: self.candidate_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}
