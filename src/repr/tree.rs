//! Regression tree in structure-of-arrays layout.
//!
//! Node 0 is the root. Internal nodes route a document left or right:
//! - numeric split: left iff `value < threshold`
//! - categorical split: left iff the category is NOT in the node's set
//!
//! A missing feature (NaN or out of range) is replaced by the node's default
//! value when the tree carries default values; otherwise it falls through the
//! comparison above (NaN is never `< threshold`, so it goes right).

use thiserror::Error;

use crate::error::{Error as CrateError, Result};
use crate::io::{ModelReader, ModelWriter};

/// Structural problems detected by [`RegressionTree::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    Empty,
    #[error("array {field} has length {len}, expected {n_nodes}")]
    LengthMismatch { field: &'static str, len: usize, n_nodes: usize },
    #[error("node {node} has child {child} outside ({node}, {n_nodes})")]
    ChildOutOfRange { node: u32, child: u32, n_nodes: usize },
    #[error("node {node} is reachable from more than one parent")]
    MultipleParents { node: u32 },
    #[error("node {node} is unreachable from the root")]
    Unreachable { node: u32 },
    #[error("categorical split on node {node} is invalid")]
    InvalidCategorical { node: u32 },
}

/// Category sets for categorical split nodes, sorted by node index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoricalSplits {
    node_indices: Vec<u32>,
    category_sets: Vec<Vec<u32>>,
}

impl CategoricalSplits {
    pub fn is_empty(&self) -> bool {
        self.node_indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.node_indices.len()
    }

    /// Category set of `node`, if it is a categorical split.
    pub fn get(&self, node: u32) -> Option<&[u32]> {
        self.node_indices
            .binary_search(&node)
            .ok()
            .map(|i| self.category_sets[i].as_slice())
    }

    fn insert(&mut self, node: u32, mut categories: Vec<u32>) {
        categories.sort_unstable();
        categories.dedup();
        match self.node_indices.binary_search(&node) {
            Ok(i) => self.category_sets[i] = categories,
            Err(i) => {
                self.node_indices.insert(i, node);
                self.category_sets.insert(i, categories);
            }
        }
    }

    fn remove(&mut self, node: u32) {
        if let Ok(i) = self.node_indices.binary_search(&node) {
            self.node_indices.remove(i);
            self.category_sets.remove(i);
        }
    }

    fn iter(&self) -> impl Iterator<Item = (u32, &[u32])> {
        self.node_indices
            .iter()
            .copied()
            .zip(self.category_sets.iter().map(Vec::as_slice))
    }
}

/// Finite non-negative values truncate to a category index; anything else
/// has no category.
#[inline]
fn float_to_category(value: f32) -> Option<u32> {
    (value.is_finite() && value >= 0.0 && value <= u32::MAX as f32).then(|| value as u32)
}

/// Which optional per-tree fields a body layout carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeFormat {
    pub default_values: bool,
    pub categorical: bool,
}

/// Immutable regression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    split_features: Vec<u32>,
    thresholds: Vec<f32>,
    left_children: Vec<u32>,
    right_children: Vec<u32>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
    default_values: Option<Vec<f32>>,
    categories: CategoricalSplits,
}

impl RegressionTree {
    /// A tree consisting of a single leaf.
    pub fn leaf(value: f32) -> Self {
        Self {
            split_features: vec![0],
            thresholds: vec![0.0],
            left_children: vec![0],
            right_children: vec![0],
            is_leaf: vec![true],
            leaf_values: vec![value],
            default_values: None,
            categories: CategoricalSplits::default(),
        }
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&l| l).count()
    }

    #[inline]
    pub fn is_leaf(&self, node: u32) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_feature(&self, node: u32) -> u32 {
        self.split_features[node as usize]
    }

    #[inline]
    pub fn threshold(&self, node: u32) -> f32 {
        self.thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: u32) -> u32 {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: u32) -> u32 {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: u32) -> f32 {
        self.leaf_values[node as usize]
    }

    pub fn default_values(&self) -> Option<&[f32]> {
        self.default_values.as_deref()
    }

    pub fn categories(&self) -> &CategoricalSplits {
        &self.categories
    }

    pub fn has_categorical(&self) -> bool {
        !self.categories.is_empty()
    }

    /// Largest feature index used by any split, if the tree has splits.
    pub fn max_split_feature(&self) -> Option<u32> {
        self.is_leaf
            .iter()
            .zip(&self.split_features)
            .filter(|(&leaf, _)| !leaf)
            .map(|(_, &f)| f)
            .max()
    }

    /// Walk from the root to the leaf reached by `features`.
    pub fn traverse_to_leaf(&self, features: &[f32]) -> u32 {
        let mut node = 0u32;
        while !self.is_leaf(node) {
            let idx = node as usize;
            let mut value = features
                .get(self.split_features[idx] as usize)
                .copied()
                .unwrap_or(f32::NAN);
            if value.is_nan() {
                if let Some(defaults) = &self.default_values {
                    value = defaults[idx];
                }
            }
            let go_left = match self.categories.get(node) {
                Some(set) => float_to_category(value).map_or(true, |c| set.binary_search(&c).is_err()),
                None => value < self.thresholds[idx],
            };
            node = if go_left {
                self.left_children[idx]
            } else {
                self.right_children[idx]
            };
        }
        node
    }

    #[inline]
    pub fn predict_row(&self, features: &[f32]) -> f32 {
        self.leaf_value(self.traverse_to_leaf(features))
    }

    /// Multiply every leaf value by `factor`.
    pub fn scale_leaves(&mut self, factor: f32) {
        for (v, _) in self
            .leaf_values
            .iter_mut()
            .zip(&self.is_leaf)
            .filter(|(_, &leaf)| leaf)
        {
            *v *= factor;
        }
    }

    /// Check structural invariants: consistent array lengths, children
    /// strictly after their parent, every node reachable exactly once.
    pub fn validate(&self) -> std::result::Result<(), TreeValidationError> {
        let n = self.n_nodes();
        if n == 0 {
            return Err(TreeValidationError::Empty);
        }
        let lengths = [
            ("split_features", self.split_features.len()),
            ("thresholds", self.thresholds.len()),
            ("left_children", self.left_children.len()),
            ("right_children", self.right_children.len()),
            ("leaf_values", self.leaf_values.len()),
        ];
        for (field, len) in lengths {
            if len != n {
                return Err(TreeValidationError::LengthMismatch { field, len, n_nodes: n });
            }
        }
        if let Some(defaults) = &self.default_values {
            if defaults.len() != n {
                return Err(TreeValidationError::LengthMismatch {
                    field: "default_values",
                    len: defaults.len(),
                    n_nodes: n,
                });
            }
        }

        let mut has_parent = vec![false; n];
        for node in 0..n {
            if self.is_leaf[node] {
                continue;
            }
            for child in [self.left_children[node], self.right_children[node]] {
                let c = child as usize;
                if c <= node || c >= n {
                    return Err(TreeValidationError::ChildOutOfRange {
                        node: node as u32,
                        child,
                        n_nodes: n,
                    });
                }
                if std::mem::replace(&mut has_parent[c], true) {
                    return Err(TreeValidationError::MultipleParents { node: child });
                }
            }
        }
        // Children always follow their parent, so a node without a parent
        // other than the root can never be reached.
        if let Some(orphan) = has_parent.iter().skip(1).position(|&p| !p) {
            return Err(TreeValidationError::Unreachable {
                node: orphan as u32 + 1,
            });
        }

        let mut prev: Option<u32> = None;
        for (node, set) in self.categories.iter() {
            let sorted = set.windows(2).all(|w| w[0] < w[1]);
            let ordered = prev.map_or(true, |p| p < node);
            if node as usize >= n || self.is_leaf[node as usize] || !sorted || !ordered {
                return Err(TreeValidationError::InvalidCategorical { node });
            }
            prev = Some(node);
        }
        Ok(())
    }

    // =========================================================================
    // Codec
    // =========================================================================

    /// Encode this tree. Fails with `InvalidInput` if the tree uses a field
    /// that `format` cannot carry.
    pub fn write_to(&self, writer: &mut ModelWriter<'_>, format: TreeFormat) -> Result<()> {
        if self.default_values.is_some() && !format.default_values {
            return Err(CrateError::invalid_input(
                "tree has default values for missing features, which this format version cannot store",
            ));
        }
        if self.has_categorical() && !format.categorical {
            return Err(CrateError::invalid_input(
                "tree has categorical splits, which this format version cannot store",
            ));
        }

        writer.write_u32_slice(&self.split_features)?;
        writer.write_f32_slice(&self.thresholds)?;
        writer.write_u32_slice(&self.left_children)?;
        writer.write_u32_slice(&self.right_children)?;
        writer.write_bool_slice(&self.is_leaf)?;
        writer.write_f32_slice(&self.leaf_values)?;

        if format.default_values {
            writer.write_bool(self.default_values.is_some())?;
            if let Some(defaults) = &self.default_values {
                writer.write_f32_slice(defaults)?;
            }
        }
        if format.categorical {
            writer.write_len(self.categories.len(), crate::io::binary::MAX_ARRAY_LEN)?;
            for (node, set) in self.categories.iter() {
                writer.write_u32(node)?;
                writer.write_u32_slice(set)?;
            }
        }
        Ok(())
    }

    /// Decode a tree written with `format` and validate its structure.
    pub fn read_from(reader: &mut ModelReader<'_>, format: TreeFormat) -> Result<Self> {
        let split_features = reader.read_u32_vec()?;
        let thresholds = reader.read_f32_vec()?;
        let left_children = reader.read_u32_vec()?;
        let right_children = reader.read_u32_vec()?;
        let is_leaf = reader.read_bool_vec()?;
        let leaf_values = reader.read_f32_vec()?;

        let default_values = if format.default_values && reader.read_bool()? {
            Some(reader.read_f32_vec()?)
        } else {
            None
        };

        let mut categories = CategoricalSplits::default();
        if format.categorical {
            let count = reader.read_len(crate::io::binary::MAX_ARRAY_LEN)?;
            for _ in 0..count {
                let node = reader.read_u32()?;
                let set = reader.read_u32_vec()?;
                categories.node_indices.push(node);
                categories.category_sets.push(set);
            }
        }

        let tree = Self {
            split_features,
            thresholds,
            left_children,
            right_children,
            is_leaf,
            leaf_values,
            default_values,
            categories,
        };
        tree.validate()
            .map_err(|e| CrateError::corrupt(format!("invalid tree: {e}")))?;
        Ok(tree)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Mutable tree under construction. All nodes start as zero-valued leaves.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    tree: RegressionTree,
}

impl TreeBuilder {
    pub fn with_n_nodes(n_nodes: usize) -> Self {
        Self {
            tree: RegressionTree {
                split_features: vec![0; n_nodes],
                thresholds: vec![0.0; n_nodes],
                left_children: vec![0; n_nodes],
                right_children: vec![0; n_nodes],
                is_leaf: vec![true; n_nodes],
                leaf_values: vec![0.0; n_nodes],
                default_values: None,
                categories: CategoricalSplits::default(),
            },
        }
    }

    /// Append a zero-valued leaf, returning its index.
    pub fn push_node(&mut self) -> u32 {
        let t = &mut self.tree;
        t.split_features.push(0);
        t.thresholds.push(0.0);
        t.left_children.push(0);
        t.right_children.push(0);
        t.is_leaf.push(true);
        t.leaf_values.push(0.0);
        if let Some(defaults) = &mut t.default_values {
            defaults.push(0.0);
        }
        (t.is_leaf.len() - 1) as u32
    }

    pub fn n_nodes(&self) -> usize {
        self.tree.n_nodes()
    }

    pub fn set_numeric_split(&mut self, node: u32, feature: u32, threshold: f32, left: u32, right: u32) -> &mut Self {
        self.set_split(node, feature, threshold, left, right);
        self.tree.categories.remove(node);
        self
    }

    pub fn set_categorical_split(
        &mut self,
        node: u32,
        feature: u32,
        categories: Vec<u32>,
        left: u32,
        right: u32,
    ) -> &mut Self {
        self.set_split(node, feature, 0.0, left, right);
        self.tree.categories.insert(node, categories);
        self
    }

    /// Value substituted for a missing feature at `node`.
    pub fn set_default_value(&mut self, node: u32, value: f32) -> &mut Self {
        let n = self.tree.n_nodes();
        self.tree.default_values.get_or_insert_with(|| vec![0.0; n])[node as usize] = value;
        self
    }

    pub fn make_leaf(&mut self, node: u32, value: f32) -> &mut Self {
        let i = node as usize;
        self.tree.is_leaf[i] = true;
        self.tree.leaf_values[i] = value;
        self.tree.left_children[i] = 0;
        self.tree.right_children[i] = 0;
        self.tree.categories.remove(node);
        self
    }

    fn set_split(&mut self, node: u32, feature: u32, threshold: f32, left: u32, right: u32) {
        let i = node as usize;
        self.tree.is_leaf[i] = false;
        self.tree.split_features[i] = feature;
        self.tree.thresholds[i] = threshold;
        self.tree.left_children[i] = left;
        self.tree.right_children[i] = right;
        self.tree.leaf_values[i] = 0.0;
    }

    /// Validate and return the finished tree.
    pub fn freeze(self) -> std::result::Result<RegressionTree, TreeValidationError> {
        self.tree.validate()?;
        Ok(self.tree)
    }
}
