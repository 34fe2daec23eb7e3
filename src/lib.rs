//! fastforest: random-forest binary classification.
//!
//! Trees are grown against a fixed `±1` target derived from document ratings,
//! averaged into a forest score, and optionally composed with a probability
//! calibrator. Models persist in a versioned little-endian binary format that
//! older revisions of the format can still be read from.
//!
//! # Example
//!
//! ```
//! use fastforest::training::{FastForestConfig, FastForestTrainer, TrainingSet};
//! use ndarray::Array2;
//!
//! let features = Array2::from_shape_fn((40, 2), |(r, c)| (r * (c + 1)) as f32);
//! let ratings: Vec<f32> = (0..40).map(|r| if r >= 20 { 1.0 } else { 0.0 }).collect();
//! let data = TrainingSet::new(features, ratings)?;
//!
//! let config = FastForestConfig::builder().n_trees(10).min_docs_in_leaf(2).build()?;
//! let model = FastForestTrainer::new(config)?.train(&data)?;
//!
//! let mut bytes = Vec::new();
//! model.save(&mut bytes)?;
//! let loaded = fastforest::io::load(bytes.as_slice())?;
//! assert_eq!(loaded.score(&[30.0, 60.0]), model.score(&[30.0, 60.0]));
//! let p = loaded.probability(&[30.0, 60.0])?;
//! assert!((0.0..=1.0).contains(&p));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! - [`training`]: configuration, labels, objective, tree growing, trainer
//! - [`model`]: [`ForestModel`] and [`CalibratedModel`]
//! - [`calibration`]: Platt and isotonic calibrators
//! - [`io`]: version negotiation, binary codec, nested-block registry
//! - [`repr`]: regression trees and ensembles

pub mod calibration;
pub mod error;
pub mod io;
pub mod model;
pub mod repr;
pub mod training;
pub mod utils;

pub use error::{Error, Result};
pub use model::{CalibratedModel, ForestModel};
pub use training::{FastForestConfig, FastForestTrainer, TrainingSet};
pub use utils::{run_with_threads, Parallelism};
