//! Tree-ensemble model and its format versions.

use crate::error::{Error, Result};
use crate::io::{FieldGate, ModelReader, ModelWriter, VersionInfo};
use crate::repr::{TreeEnsemble, TreeFormat};
use crate::training::FastForestConfig;

/// Initial format: ensemble and options string only.
pub const VERSION_INITIAL: u32 = 0x0001_0001;

/// Version descriptor of the binary random-forest model.
pub const FOREST_VERSION: VersionInfo = VersionInfo::new(
    b"FFORE BC",
    0x0001_0005,
    0x0001_0005,
    VERSION_INITIAL,
    "FastForestBinaryExec",
);

/// Explicit feature count after the ensemble.
pub const FEATURE_COUNT: FieldGate = FieldGate::new("feature count", 0x0001_0002);
/// Per-node default values for missing features.
pub const DEFAULT_VALUES: FieldGate = FieldGate::new("default values", 0x0001_0003);
/// Categorical split sets.
pub const CATEGORICAL_SPLITS: FieldGate = FieldGate::new("categorical splits", 0x0001_0004);
/// Calibrator presence flag and nested calibrator block.
pub const CALIBRATOR: FieldGate = FieldGate::new("calibrator", 0x0001_0005);

/// Tree layout of a body stamped `version`.
pub(crate) fn tree_format(version: u32) -> TreeFormat {
    TreeFormat {
        default_values: DEFAULT_VALUES.is_present(version),
        categorical: CATEGORICAL_SPLITS.is_present(version),
    }
}

/// A trained ensemble plus the metadata persisted with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestModel {
    ensemble: TreeEnsemble,
    n_features: u32,
    inner_options: String,
}

impl ForestModel {
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if `n_features` is zero, does not fit the
    /// format's `i32` field, or is not larger than every split feature.
    pub fn new(ensemble: TreeEnsemble, n_features: usize, inner_options: impl Into<String>) -> Result<Self> {
        if n_features == 0 || n_features > i32::MAX as usize {
            return Err(Error::invalid_input(format!(
                "feature count must be in 1..={}, got {n_features}",
                i32::MAX
            )));
        }
        let n_features = n_features as u32;
        check_split_features(&ensemble, n_features).map_err(Error::InvalidInput)?;
        Ok(Self {
            ensemble,
            n_features,
            inner_options: inner_options.into(),
        })
    }

    pub fn ensemble(&self) -> &TreeEnsemble {
        &self.ensemble
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features as usize
    }

    /// Opaque options string recorded at training time.
    pub fn inner_options(&self) -> &str {
        &self.inner_options
    }

    /// The training configuration, if the options string holds one.
    pub fn training_config(&self) -> Option<FastForestConfig> {
        FastForestConfig::from_options_string(&self.inner_options)
    }

    /// Raw score of one row.
    #[inline]
    pub fn predict_row(&self, features: &[f32]) -> f32 {
        self.ensemble.predict_row(features)
    }

    /// Returns an error naming the first field `version` cannot carry.
    pub(crate) fn check_expressible(&self, version: u32) -> Result<()> {
        let unsupported = if self.ensemble.has_categorical() && !CATEGORICAL_SPLITS.is_present(version) {
            Some(CATEGORICAL_SPLITS)
        } else if self.ensemble.has_default_values() && !DEFAULT_VALUES.is_present(version) {
            Some(DEFAULT_VALUES)
        } else {
            None
        };
        match unsupported {
            Some(gate) => Err(Error::invalid_input(format!(
                "format version {version:#010x} cannot store {} (introduced in {:#010x})",
                gate.name, gate.introduced
            ))),
            None => Ok(()),
        }
    }

    /// Write the forest fields of a body stamped `version`.
    pub(crate) fn write_fields(&self, writer: &mut ModelWriter<'_>, version: u32) -> Result<()> {
        self.ensemble.write_to(writer, tree_format(version))?;
        if FEATURE_COUNT.is_present(version) {
            writer.write_i32(self.n_features as i32)?;
        }
        writer.write_string(&self.inner_options)
    }

    /// Read the forest fields of a body stamped `version`.
    pub(crate) fn read_fields(reader: &mut ModelReader<'_>, version: u32) -> Result<Self> {
        let ensemble = TreeEnsemble::read_from(reader, tree_format(version))?;
        let n_features = if FEATURE_COUNT.is_present(version) {
            let n = reader.read_i32()?;
            if n <= 0 {
                return Err(Error::corrupt(format!("feature count must be positive, got {n}")));
            }
            n as u32
        } else {
            match ensemble.max_split_feature() {
                Some(max) if max >= i32::MAX as u32 => {
                    return Err(Error::corrupt(format!(
                        "split on feature {max} implies more than {} features",
                        i32::MAX
                    )));
                }
                Some(max) => max + 1,
                None => 1,
            }
        };
        check_split_features(&ensemble, n_features).map_err(Error::CorruptModel)?;
        let inner_options = reader.read_string()?;
        Ok(Self {
            ensemble,
            n_features,
            inner_options,
        })
    }
}

fn check_split_features(ensemble: &TreeEnsemble, n_features: u32) -> std::result::Result<(), String> {
    match ensemble.max_split_feature() {
        Some(max) if max >= n_features => Err(format!(
            "split on feature {max} but the model has {n_features} features"
        )),
        _ => Ok(()),
    }
}
