//! Random-forest training.
//!
//! - [`FastForestConfig`], [`ConfigError`]: validated training parameters
//! - [`TrainingSet`], [`QueryBoundaries`]: training examples grouped by query
//! - [`binary_labels`]: rating to label conversion
//! - [`RandomForestObjective`]: fixed `±1` gradient target per query
//! - [`TreeGrower`], [`BaggedTreeGrower`]: tree construction from gradients
//! - [`FastForestTrainer`]: the full pipeline, ending in a [`CalibratedModel`](crate::model::CalibratedModel)

mod config;
mod dataset;
mod grower;
mod labels;
mod objective;
mod trainer;

pub use config::{CalibratorKind, ConfigError, FastForestConfig, FastForestConfigBuilder};
pub use dataset::{QueryBoundaries, TrainingSet};
pub use grower::{BaggedTreeGrower, TreeGrower};
pub use labels::{binary_labels, POSITIVE_RATING};
pub use objective::RandomForestObjective;
pub use trainer::FastForestTrainer;
