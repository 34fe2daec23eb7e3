//! Tree growing from a gradient pass.
//!
//! [`TreeGrower`] is the seam between the objective and tree construction.
//! [`BaggedTreeGrower`] is the built-in implementation: each tree sees a
//! seeded row sample and feature sample, and grows best-first (leaf-wise) by
//! least-squares gain until the leaf budget is spent or no split qualifies.

use std::fmt;

use ndarray::ArrayView2;
use rand::seq::index;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::FastForestConfig;
use crate::error::{Error, Result};
use crate::repr::{RegressionTree, TreeBuilder};

/// Grows one regression tree fitting `gradients`.
pub trait TreeGrower: Send + Sync + fmt::Debug {
    /// Grow tree number `tree_index`. Leaf outputs must lie within
    /// `±max_tree_output`.
    fn grow(
        &self,
        features: ArrayView2<'_, f32>,
        gradients: &[f32],
        weights: Option<&[f32]>,
        max_tree_output: f32,
        tree_index: u32,
    ) -> Result<RegressionTree>;
}

// =============================================================================
// BaggedTreeGrower
// =============================================================================

/// Leaf-wise least-squares grower with row bagging and feature sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct BaggedTreeGrower {
    pub n_leaves: u32,
    pub min_docs_in_leaf: u32,
    pub bagging_fraction: f32,
    pub feature_fraction: f32,
    pub seed: u64,
}

impl BaggedTreeGrower {
    pub fn from_config(config: &FastForestConfig) -> Self {
        Self {
            n_leaves: config.n_leaves,
            min_docs_in_leaf: config.min_docs_in_leaf,
            bagging_fraction: config.bagging_fraction,
            feature_fraction: config.feature_fraction,
            seed: config.seed,
        }
    }

    fn rng_for_tree(&self, tree_index: u32) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(self.seed.wrapping_add(u64::from(tree_index)))
    }
}

/// Sample `ceil(n * fraction)` of `0..n` (at least one), sorted.
fn sample_sorted(rng: &mut Xoshiro256PlusPlus, n: usize, fraction: f32) -> Vec<usize> {
    let amount = ((n as f64 * f64::from(fraction)).ceil() as usize).clamp(1, n);
    if amount == n {
        return (0..n).collect();
    }
    let mut picked = index::sample(rng, n, amount).into_vec();
    picked.sort_unstable();
    picked
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f32,
    gain: f64,
}

/// A leaf of the tree under construction.
#[derive(Debug)]
struct Candidate {
    node: u32,
    rows: Vec<usize>,
    split: Option<Split>,
}

/// Read-only inputs shared by every split search of one tree.
struct GrowContext<'a> {
    features: ArrayView2<'a, f32>,
    gradients: &'a [f32],
    weights: Option<&'a [f32]>,
    columns: Vec<usize>,
    min_docs: usize,
}

impl GrowContext<'_> {
    #[inline]
    fn weight(&self, row: usize) -> f64 {
        self.weights.map_or(1.0, |w| f64::from(w[row]))
    }

    fn leaf_value(&self, rows: &[usize], max_tree_output: f32) -> f32 {
        let (mut sum, mut weight) = (0.0f64, 0.0f64);
        for &r in rows {
            let w = self.weight(r);
            sum += w * f64::from(self.gradients[r]);
            weight += w;
        }
        let mean = if weight > 0.0 { sum / weight } else { 0.0 };
        (mean as f32).clamp(-max_tree_output, max_tree_output)
    }

    /// Best numeric split of `rows` by weighted variance reduction. Missing
    /// values go right, matching tree traversal without default values.
    fn best_split(&self, rows: &[usize]) -> Option<Split> {
        if rows.len() < 2 * self.min_docs {
            return None;
        }
        let (mut total_sum, mut total_weight) = (0.0f64, 0.0f64);
        for &r in rows {
            let w = self.weight(r);
            total_sum += w * f64::from(self.gradients[r]);
            total_weight += w;
        }
        if total_weight <= 0.0 {
            return None;
        }
        let parent_score = total_sum * total_sum / total_weight;

        let mut best: Option<Split> = None;
        let mut order = rows.to_vec();
        for &feature in &self.columns {
            let column = self.features.column(feature);
            order.sort_unstable_by(|&a, &b| {
                let (x, y) = (column[a], column[b]);
                x.is_nan().cmp(&y.is_nan()).then(x.total_cmp(&y))
            });
            let n_present = order.iter().take_while(|&&r| !column[r].is_nan()).count();

            let (mut left_sum, mut left_weight) = (0.0f64, 0.0f64);
            for i in 0..n_present.saturating_sub(1) {
                let r = order[i];
                let w = self.weight(r);
                left_sum += w * f64::from(self.gradients[r]);
                left_weight += w;

                let n_left = i + 1;
                if n_left < self.min_docs || rows.len() - n_left < self.min_docs {
                    continue;
                }
                let (lo, hi) = (column[r], column[order[i + 1]]);
                if lo == hi {
                    continue;
                }
                let right_weight = total_weight - left_weight;
                if left_weight <= 0.0 || right_weight <= 0.0 {
                    continue;
                }
                let right_sum = total_sum - left_sum;
                let gain =
                    left_sum * left_sum / left_weight + right_sum * right_sum / right_weight - parent_score;
                if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                    // rows with value < threshold go left
                    let mid = lo + (hi - lo) / 2.0;
                    let threshold = if mid > lo { mid } else { hi };
                    best = Some(Split {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }

    fn candidate(&self, node: u32, rows: Vec<usize>) -> Candidate {
        let split = self.best_split(&rows);
        Candidate { node, rows, split }
    }
}

impl TreeGrower for BaggedTreeGrower {
    fn grow(
        &self,
        features: ArrayView2<'_, f32>,
        gradients: &[f32],
        weights: Option<&[f32]>,
        max_tree_output: f32,
        tree_index: u32,
    ) -> Result<RegressionTree> {
        let n_rows = features.nrows();
        if gradients.len() != n_rows || weights.is_some_and(|w| w.len() != n_rows) {
            return Err(Error::invalid_input(format!(
                "grower inputs disagree: {n_rows} rows, {} gradients",
                gradients.len()
            )));
        }
        if n_rows == 0 || features.ncols() == 0 {
            return Ok(RegressionTree::leaf(0.0));
        }

        let mut rng = self.rng_for_tree(tree_index);
        let rows = sample_sorted(&mut rng, n_rows, self.bagging_fraction);
        let columns = sample_sorted(&mut rng, features.ncols(), self.feature_fraction);
        let ctx = GrowContext {
            features: features.view(),
            gradients,
            weights,
            columns,
            min_docs: self.min_docs_in_leaf.max(1) as usize,
        };

        let mut builder = TreeBuilder::with_n_nodes(1);
        let mut leaves = vec![ctx.candidate(0, rows)];
        while leaves.len() < self.n_leaves as usize {
            let best = leaves
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.split.map(|s| (i, s.gain)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);
            let Some(idx) = best else { break };
            let Candidate { node, rows, split } = leaves.swap_remove(idx);
            let Some(split) = split else { break };

            let column = ctx.features.column(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.into_iter().partition(|&r| column[r] < split.threshold);

            let left = builder.push_node();
            let right = builder.push_node();
            builder.set_numeric_split(node, split.feature as u32, split.threshold, left, right);
            leaves.push(ctx.candidate(left, left_rows));
            leaves.push(ctx.candidate(right, right_rows));
        }

        for leaf in &leaves {
            builder.make_leaf(leaf.node, ctx.leaf_value(&leaf.rows, max_tree_output));
        }
        let tree = builder
            .freeze()
            .map_err(|e| Error::invalid_input(format!("grown tree is malformed: {e}")))?;
        tracing::trace!(tree_index, n_leaves = tree.n_leaves(), "grew tree");
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn grower(n_leaves: u32, min_docs: u32) -> BaggedTreeGrower {
        BaggedTreeGrower {
            n_leaves,
            min_docs_in_leaf: min_docs,
            bagging_fraction: 1.0,
            feature_fraction: 1.0,
            seed: 7,
        }
    }

    #[test]
    fn finds_the_separating_feature() {
        // feature 1 separates the targets, feature 0 is noise
        let features = Array2::from_shape_fn((40, 2), |(r, c)| if c == 0 { (r % 5) as f32 } else { r as f32 });
        let gradients: Vec<f32> = (0..40).map(|r| if r < 20 { -1.0 } else { 1.0 }).collect();
        let tree = grower(2, 1).grow(features.view(), &gradients, None, 100.0, 0).unwrap();
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.split_feature(0), 1);
        assert_eq!(tree.predict_row(&[0.0, 3.0]), -1.0);
        assert_eq!(tree.predict_row(&[0.0, 30.0]), 1.0);
    }

    #[test]
    fn leaf_budget_and_min_docs_are_respected() {
        let features = Array2::from_shape_fn((100, 1), |(r, _)| r as f32);
        let gradients: Vec<f32> = (0..100).map(|r| if r % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let tree = grower(8, 10).grow(features.view(), &gradients, None, 100.0, 0).unwrap();
        assert!(tree.n_leaves() <= 8);
    }

    #[test]
    fn leaf_outputs_are_clamped() {
        let features = Array2::from_shape_fn((10, 1), |(r, _)| r as f32);
        let gradients = vec![1.0f32; 10];
        let tree = grower(4, 1).grow(features.view(), &gradients, None, 0.25, 0).unwrap();
        assert_eq!(tree.predict_row(&[0.0]), 0.25);
    }

    #[test]
    fn constant_target_stays_a_leaf() {
        let features = Array2::from_shape_fn((10, 2), |(r, c)| (r * c) as f32);
        let tree = grower(4, 1).grow(features.view(), &[-1.0; 10], None, 100.0, 0).unwrap();
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_row(&[0.0, 0.0]), -1.0);
    }

    #[test]
    fn sampling_is_seeded() {
        let features = Array2::from_shape_fn((60, 4), |(r, c)| ((r * 7 + c * 13) % 17) as f32);
        let gradients: Vec<f32> = (0..60).map(|r| if (r * 7) % 17 > 8 { 1.0 } else { -1.0 }).collect();
        let g = BaggedTreeGrower {
            bagging_fraction: 0.5,
            feature_fraction: 0.5,
            ..grower(6, 2)
        };
        let a = g.grow(features.view(), &gradients, None, 100.0, 3).unwrap();
        let b = g.grow(features.view(), &gradients, None, 100.0, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_values_go_right() {
        let features = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, f32::NAN, f32::NAN]).unwrap();
        let gradients = [-1.0, 1.0, 1.0, 1.0];
        let tree = grower(2, 1).grow(features.view(), &gradients, None, 100.0, 0).unwrap();
        assert_eq!(tree.predict_row(&[f32::NAN]), 1.0);
        assert_eq!(tree.predict_row(&[0.25]), -1.0);
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let features = Array2::<f32>::zeros((3, 1));
        assert!(grower(2, 1).grow(features.view(), &[1.0], None, 1.0, 0).is_err());
    }
}
