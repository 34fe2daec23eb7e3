//! Canonical tree-ensemble representation.
//!
//! - [`RegressionTree`]: immutable SoA tree, built through [`TreeBuilder`]
//! - [`TreeEnsemble`]: trees whose outputs are summed into a raw score

pub mod ensemble;
pub mod tree;

pub use ensemble::TreeEnsemble;
pub use tree::{CategoricalSplits, RegressionTree, TreeBuilder, TreeFormat, TreeValidationError};
