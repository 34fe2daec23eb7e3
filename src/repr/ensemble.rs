//! Tree ensemble and its body codec.

use super::tree::{RegressionTree, TreeFormat};
use crate::error::{Error, Result};
use crate::io::binary::MAX_ARRAY_LEN;
use crate::io::{ModelReader, ModelWriter};

/// Ordered collection of regression trees whose outputs are summed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeEnsemble {
    trees: Vec<RegressionTree>,
}

impl TreeEnsemble {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_trees(trees: Vec<RegressionTree>) -> Self {
        Self { trees }
    }

    pub fn push_tree(&mut self, tree: RegressionTree) {
        self.trees.push(tree);
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &RegressionTree {
        &self.trees[idx]
    }

    pub fn trees(&self) -> impl Iterator<Item = &RegressionTree> {
        self.trees.iter()
    }

    /// Sum of all tree outputs for one row.
    pub fn predict_row(&self, features: &[f32]) -> f32 {
        self.trees.iter().map(|t| t.predict_row(features)).sum()
    }

    /// Multiply every leaf of every tree by `factor`.
    pub fn scale_leaves(&mut self, factor: f32) {
        self.trees.iter_mut().for_each(|t| t.scale_leaves(factor));
    }

    pub fn max_split_feature(&self) -> Option<u32> {
        self.trees.iter().filter_map(RegressionTree::max_split_feature).max()
    }

    pub fn has_categorical(&self) -> bool {
        self.trees.iter().any(RegressionTree::has_categorical)
    }

    pub fn has_default_values(&self) -> bool {
        self.trees.iter().any(|t| t.default_values().is_some())
    }

    /// Encode all trees using the given per-tree layout.
    pub fn write_to(&self, writer: &mut ModelWriter<'_>, format: TreeFormat) -> Result<()> {
        writer.write_len(self.trees.len(), MAX_ARRAY_LEN)?;
        for tree in &self.trees {
            tree.write_to(writer, format)?;
        }
        Ok(())
    }

    pub fn read_from(reader: &mut ModelReader<'_>, format: TreeFormat) -> Result<Self> {
        let n_trees = reader.read_len(MAX_ARRAY_LEN)?;
        let mut trees = Vec::with_capacity(n_trees.min(1024));
        for idx in 0..n_trees {
            let tree = RegressionTree::read_from(reader, format).map_err(|e| match e {
                Error::CorruptModel(msg) => Error::corrupt(format!("tree {idx}: {msg}")),
                other => other,
            })?;
            trees.push(tree);
        }
        Ok(Self { trees })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::tree::TreeBuilder;

    fn stump(feature: u32, threshold: f32, left: f32, right: f32) -> RegressionTree {
        let mut b = TreeBuilder::with_n_nodes(3);
        b.set_numeric_split(0, feature, threshold, 1, 2)
            .make_leaf(1, left)
            .make_leaf(2, right);
        b.freeze().unwrap()
    }

    #[test]
    fn predictions_sum_trees() {
        let ensemble = TreeEnsemble::from_trees(vec![stump(0, 0.5, -1.0, 1.0), stump(3, 0.0, 0.25, 0.5)]);
        assert_eq!(ensemble.predict_row(&[0.0, 0.0, 0.0, 1.0]), -0.5);
        assert_eq!(ensemble.max_split_feature(), Some(3));
        assert!(!ensemble.has_categorical());
        assert!(!ensemble.has_default_values());
    }

    #[test]
    fn leaf_only_ensemble_has_no_split_feature() {
        let ensemble = TreeEnsemble::from_trees(vec![RegressionTree::leaf(1.0)]);
        assert_eq!(ensemble.max_split_feature(), None);
        assert_eq!(ensemble.predict_row(&[]), 1.0);
    }

    #[test]
    fn codec_roundtrip() {
        let mut ensemble = TreeEnsemble::new();
        ensemble.push_tree(stump(0, 0.5, -1.0, 1.0));
        ensemble.push_tree(stump(1, 2.5, 0.1, 0.2));
        let format = TreeFormat {
            default_values: false,
            categorical: false,
        };

        let mut buf = Vec::new();
        ensemble.write_to(&mut ModelWriter::new(&mut buf), format).unwrap();
        let mut src = buf.as_slice();
        let decoded = TreeEnsemble::read_from(&mut ModelReader::new(&mut src), format).unwrap();
        assert_eq!(decoded, ensemble);
    }
}
