//! Training configuration with builder pattern.
//!
//! [`FastForestConfig`] uses the `bon` crate for builder generation, with a
//! custom finishing function that validates every parameter.
//!
//! # Example
//!
//! ```
//! use fastforest::training::{CalibratorKind, FastForestConfig};
//!
//! // All defaults
//! let config = FastForestConfig::builder().build().unwrap();
//! assert_eq!(config.n_trees, 100);
//!
//! let config = FastForestConfig::builder()
//!     .n_trees(50)
//!     .n_leaves(31)
//!     .calibrator(CalibratorKind::Pav)
//!     .build()
//!     .unwrap();
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ConfigError
// =============================================================================

/// Invalid training parameters or unusable training data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("n_trees must be at least 1")]
    InvalidNTrees,

    #[error("n_leaves must be at least 2, got {0}")]
    InvalidNLeaves(u32),

    #[error("min_docs_in_leaf must be at least 1")]
    InvalidMinDocsInLeaf,

    #[error("max_tree_output must be positive and finite, got {0}")]
    InvalidMaxTreeOutput(f32),

    #[error("{field} must be in (0, 1], got {value}")]
    InvalidSamplingRatio { field: &'static str, value: f32 },

    #[error("max_calibration_examples must be at least 1")]
    InvalidMaxCalibrationExamples,

    #[error("training set has no labels")]
    EmptyLabels,

    #[error("training set has no feature columns")]
    NoFeatures,

    #[error("{what}: expected {expected} rows, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("rating at row {row} must be finite and non-negative, got {value}")]
    InvalidRating { row: usize, value: f32 },

    #[error("weight at row {row} must be finite and non-negative, got {value}")]
    InvalidWeight { row: usize, value: f32 },

    #[error("calibration set is empty")]
    EmptyCalibrationSet,

    #[error("{what} carry no positive weight")]
    ZeroTotalWeight { what: &'static str },
}

// =============================================================================
// CalibratorKind
// =============================================================================

/// Calibrator fitted after the forest is trained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibratorKind {
    /// No calibrator; the model only produces raw scores.
    None,
    /// Sigmoid fit ([`PlattCalibrator`](crate::calibration::PlattCalibrator)).
    #[default]
    Platt,
    /// Isotonic fit ([`PavCalibrator`](crate::calibration::PavCalibrator)).
    Pav,
}

// =============================================================================
// FastForestConfig
// =============================================================================

/// Configuration for random-forest training.
///
/// The serialized form of the config used for training is stored in every
/// trained model (see [`ForestModel::training_config`](crate::model::ForestModel::training_config)).
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct FastForestConfig {
    /// Number of trees. Default: 100.
    #[builder(default = 100)]
    pub n_trees: u32,

    /// Maximum leaves per tree. Default: 20.
    #[builder(default = 20)]
    pub n_leaves: u32,

    /// Minimum documents in a leaf. Default: 10.
    #[builder(default = 10)]
    pub min_docs_in_leaf: u32,

    /// Bound on the magnitude of any single leaf output. Default: 100.
    #[builder(default = 100.0)]
    pub max_tree_output: f32,

    /// Fraction of rows sampled (without replacement) per tree. Default: 0.7.
    #[builder(default = 0.7)]
    pub bagging_fraction: f32,

    /// Fraction of features considered per tree. Default: 0.7.
    #[builder(default = 0.7)]
    pub feature_fraction: f32,

    /// Cap on the examples used to fit the calibrator. Larger training sets
    /// are subsampled deterministically. Default: 1,000,000.
    #[builder(default = 1_000_000)]
    pub max_calibration_examples: usize,

    /// Calibrator to fit after training. Default: Platt.
    #[builder(default)]
    pub calibrator: CalibratorKind,

    /// Number of threads. 0 = auto, 1 = sequential. Default: 0.
    #[builder(default = 0)]
    pub n_threads: usize,

    /// Random seed for bagging, feature sampling and calibration
    /// subsampling. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,
}

/// Custom finishing function that validates the config.
impl<S: fast_forest_config_builder::IsComplete> FastForestConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any parameter is out of range.
    pub fn build(self) -> Result<FastForestConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl FastForestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_trees == 0 {
            return Err(ConfigError::InvalidNTrees);
        }
        if self.n_leaves < 2 {
            return Err(ConfigError::InvalidNLeaves(self.n_leaves));
        }
        if self.min_docs_in_leaf == 0 {
            return Err(ConfigError::InvalidMinDocsInLeaf);
        }
        if !(self.max_tree_output.is_finite() && self.max_tree_output > 0.0) {
            return Err(ConfigError::InvalidMaxTreeOutput(self.max_tree_output));
        }
        for (field, value) in [
            ("bagging_fraction", self.bagging_fraction),
            ("feature_fraction", self.feature_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidSamplingRatio { field, value });
            }
        }
        if self.max_calibration_examples == 0 {
            return Err(ConfigError::InvalidMaxCalibrationExamples);
        }
        Ok(())
    }

    /// Render as the options string stored alongside a trained model.
    pub fn to_options_string(&self) -> String {
        // a struct of plain numbers and unit enums always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse an options string. Returns `None` when it is empty, not a
    /// config, or describes an invalid config.
    pub fn from_options_string(options: &str) -> Option<Self> {
        let config: Self = serde_json::from_str(options).ok()?;
        config.validate().ok()?;
        Some(config)
    }
}

impl Default for FastForestConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}
