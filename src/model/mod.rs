//! Trained models.
//!
//! - [`ForestModel`]: tree ensemble, feature count and training options
//! - [`CalibratedModel`]: a [`ForestModel`] plus an optional calibrator; the
//!   type returned by training and loading
//!
//! # Format versions
//!
//! | Version      | Adds                                    |
//! |--------------|-----------------------------------------|
//! | `0x00010001` | ensemble, options string                |
//! | `0x00010002` | explicit feature count                  |
//! | `0x00010003` | per-node default values                 |
//! | `0x00010004` | categorical splits                      |
//! | `0x00010005` | calibrator flag and nested block        |

mod calibrated;
mod forest;

pub use calibrated::CalibratedModel;
pub use forest::{
    ForestModel, CALIBRATOR, CATEGORICAL_SPLITS, DEFAULT_VALUES, FEATURE_COUNT, FOREST_VERSION, VERSION_INITIAL,
};
