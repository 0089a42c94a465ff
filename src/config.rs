//! Analysis configuration
//!
//! Loaded from TOML; every field is optional and falls back to the defaults
//! below. Command-line flags override file values.
//!
//! ```toml
//! analysis = "statistical"
//! target_depth = 2
//! n_value = 3
//! encoding = "native"
//! work_dir = "/tmp/pila"
//! ```

use crate::error::{CallStackError, Result};
use crate::store::EncodingMode;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which detector family the analysis runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Per-position mean/std within each root group
    #[default]
    Statistical,
    /// Exported model, falling back to a dimension check
    Model,
}

/// Parameters of one analysis run
///
/// # Example
/// ```
/// use pila::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.n_value, 3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub analysis: AnalysisKind,

    /// Depth whose calls become roots of the encoded subtrees (>= 1)
    pub target_depth: u32,

    /// Sensitivity: a position is anomalous when `value - mean > n_value * std`
    pub n_value: u32,

    /// Matrix layout inside stored records
    pub encoding: EncodingMode,

    /// Model container directory, required for `analysis = "model"`
    pub model_dir: Option<PathBuf>,

    /// Model scores above this are anomalies, in [0, 1]
    pub anomaly_threshold: f64,

    /// Directory holding the array store
    pub work_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisKind::Statistical,
            target_depth: 1,
            n_value: 3,
            encoding: EncodingMode::Native,
            model_dir: None,
            anomaly_threshold: 0.5,
            work_dir: PathBuf::from(".pila"),
        }
    }
}

impl AnalysisConfig {
    /// Flags a record as soon as any position exceeds one standard deviation
    pub fn strict() -> Self {
        Self {
            n_value: 1,
            ..Self::default()
        }
    }

    /// Only flags positions five standard deviations out
    pub fn permissive() -> Self {
        Self {
            n_value: 5,
            ..Self::default()
        }
    }

    /// Read and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            return Err(CallStackError::MissingArtifact(path_ref.to_path_buf()));
        }

        let contents = fs::read_to_string(path_ref)?;
        let config: AnalysisConfig = toml::from_str(&contents).map_err(|e| {
            CallStackError::InvalidConfig(format!("{}: {}", path_ref.display(), e))
        })?;
        config.validate().map_err(CallStackError::InvalidConfig)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.target_depth < 1 {
            return Err(format!(
                "target_depth must be >= 1, got {}",
                self.target_depth
            ));
        }

        if !(0.0..=1.0).contains(&self.anomaly_threshold) {
            return Err(format!(
                "anomaly_threshold must be in [0, 1], got {}",
                self.anomaly_threshold
            ));
        }

        if self.analysis == AnalysisKind::Model && self.model_dir.is_none() {
            return Err("model analysis requires model_dir".to_string());
        }

        Ok(())
    }
}
