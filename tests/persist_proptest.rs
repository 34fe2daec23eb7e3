//! Property tests: arbitrary forests survive a save/load cycle unchanged.

mod common;

use proptest::prelude::*;

use fastforest::calibration::{Calibrator, PavCalibrator, PlattCalibrator};
use fastforest::model::{CalibratedModel, ForestModel};
use fastforest::repr::{RegressionTree, TreeBuilder, TreeEnsemble};

const N_FEATURES: u32 = 5;

#[derive(Debug, Clone)]
struct TreeSpec {
    depth: u32,
    features: Vec<u32>,
    thresholds: Vec<f32>,
    leaves: Vec<f32>,
    categorical_root: Option<Vec<u32>>,
    root_default: Option<f32>,
}

fn tree_spec() -> impl Strategy<Value = TreeSpec> {
    (0u32..4).prop_flat_map(|depth| {
        let n_internal = (1usize << depth) - 1;
        let n_leaves = 1usize << depth;
        (
            Just(depth),
            prop::collection::vec(0..N_FEATURES, n_internal),
            prop::collection::vec(-10.0f32..10.0, n_internal),
            prop::collection::vec(-1.0f32..1.0, n_leaves),
            prop::option::of(prop::collection::btree_set(0u32..16, 1..4)),
            prop::option::of(-5.0f32..5.0),
        )
            .prop_map(|(depth, features, thresholds, leaves, cats, root_default)| TreeSpec {
                depth,
                features,
                thresholds,
                leaves,
                categorical_root: cats.map(|s| s.into_iter().collect()),
                root_default,
            })
    })
}

/// Complete binary tree in heap order: node `i` has children `2i+1`, `2i+2`.
fn build(spec: &TreeSpec) -> RegressionTree {
    if spec.depth == 0 {
        return RegressionTree::leaf(spec.leaves[0]);
    }
    let n_internal = spec.features.len();
    let n_nodes = n_internal + spec.leaves.len();
    let mut builder = TreeBuilder::with_n_nodes(n_nodes);
    for i in 0..n_internal {
        let (left, right) = (2 * i as u32 + 1, 2 * i as u32 + 2);
        match (&spec.categorical_root, i) {
            (Some(set), 0) => builder.set_categorical_split(0, spec.features[0], set.clone(), left, right),
            _ => builder.set_numeric_split(i as u32, spec.features[i], spec.thresholds[i], left, right),
        };
    }
    for (j, &value) in spec.leaves.iter().enumerate() {
        builder.make_leaf((n_internal + j) as u32, value);
    }
    if let Some(default) = spec.root_default {
        builder.set_default_value(0, default);
    }
    builder.freeze().unwrap()
}

fn calibrator_strategy() -> impl Strategy<Value = Option<Box<dyn Calibrator>>> {
    prop_oneof![
        Just(()).prop_map(|_| None),
        (-5.0f64..5.0, -5.0f64..5.0)
            .prop_map(|(a, b)| Some(Box::new(PlattCalibrator::new(a, b).unwrap()) as Box<dyn Calibrator>)),
        prop::collection::vec((0.1f32..2.0, 0.0f32..1.0), 1..6).prop_map(|steps| {
            // widths and value increments, folded into sorted disjoint bins
            let (mut mins, mut maxes, mut values) = (Vec::new(), Vec::new(), Vec::new());
            let (mut at, mut value) = (-5.0f32, 0.0f32);
            for (width, increment) in steps {
                mins.push(at);
                maxes.push(at + width);
                value = (value + increment / 6.0).min(1.0);
                values.push(value);
                at += 2.0 * width;
            }
            Some(Box::new(PavCalibrator::new(mins, maxes, values).unwrap()) as Box<dyn Calibrator>)
        }),
    ]
}

fn row_strategy() -> impl Strategy<Value = Vec<f32>> {
    let value = prop_oneof![
        4 => -12.0f32..12.0,
        1 => Just(f32::NAN),
        1 => (0u32..16).prop_map(|c| c as f32),
    ];
    prop::collection::vec(value, N_FEATURES as usize)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arbitrary_models_roundtrip(
        specs in prop::collection::vec(tree_spec(), 0..6),
        calibrator in calibrator_strategy(),
        options in "[a-z0-9{}:,\"]{0,24}",
        rows in prop::collection::vec(row_strategy(), 1..8),
    ) {
        let ensemble = TreeEnsemble::from_trees(specs.iter().map(build).collect());
        let base = ForestModel::new(ensemble, N_FEATURES as usize, options).unwrap();
        let model = CalibratedModel::new(base, calibrator);

        let bytes = common::save(&model);
        let loaded = fastforest::io::load(bytes.as_slice()).unwrap();

        prop_assert_eq!(loaded.base(), model.base());
        prop_assert_eq!(loaded.has_calibrator(), model.has_calibrator());
        for row in &rows {
            prop_assert_eq!(loaded.score(row).to_bits(), model.score(row).to_bits());
            if model.has_calibrator() {
                prop_assert_eq!(loaded.probability(row).unwrap(), model.probability(row).unwrap());
            }
        }
        prop_assert_eq!(common::save(&loaded), bytes);
    }

    #[test]
    fn truncated_models_never_load(
        specs in prop::collection::vec(tree_spec(), 1..4),
        cut in 0.0f64..1.0,
    ) {
        let ensemble = TreeEnsemble::from_trees(specs.iter().map(build).collect());
        let model = CalibratedModel::uncalibrated(ForestModel::new(ensemble, N_FEATURES as usize, "").unwrap());
        let bytes = common::save(&model);
        let len = ((bytes.len() as f64) * cut) as usize;
        prop_assert!(fastforest::io::load(&bytes[..len]).is_err());
    }
}
