//! Shared model fixtures for integration tests.

#![allow(dead_code)]

use fastforest::calibration::{Calibrator, PavCalibrator, PlattCalibrator};
use fastforest::model::{CalibratedModel, ForestModel};
use fastforest::repr::{RegressionTree, TreeBuilder, TreeEnsemble};

/// root: x0 < t ? (x1 < 1 ? a : b) : c
pub fn numeric_tree(threshold: f32, a: f32, b: f32, c: f32) -> RegressionTree {
    let mut builder = TreeBuilder::with_n_nodes(5);
    builder
        .set_numeric_split(0, 0, threshold, 1, 2)
        .set_numeric_split(1, 1, 1.0, 3, 4)
        .make_leaf(2, c)
        .make_leaf(3, a)
        .make_leaf(4, b);
    builder.freeze().unwrap()
}

/// Categorical root on feature 2 with a default value on its numeric child.
pub fn rich_tree() -> RegressionTree {
    let mut builder = TreeBuilder::with_n_nodes(5);
    builder
        .set_categorical_split(0, 2, vec![1, 3], 1, 2)
        .set_numeric_split(2, 1, 0.5, 3, 4)
        .set_default_value(2, 0.75)
        .make_leaf(1, -0.5)
        .make_leaf(3, 0.25)
        .make_leaf(4, 1.0);
    builder.freeze().unwrap()
}

pub fn numeric_forest() -> ForestModel {
    let ensemble = TreeEnsemble::from_trees(vec![
        numeric_tree(0.5, -1.0, 0.5, 1.0),
        numeric_tree(2.0, -0.25, 0.0, 0.75),
        RegressionTree::leaf(0.125),
    ]);
    ForestModel::new(ensemble, 4, r#"{"n_trees":3}"#).unwrap()
}

pub fn rich_forest() -> ForestModel {
    let ensemble = TreeEnsemble::from_trees(vec![numeric_tree(0.5, -1.0, 0.5, 1.0), rich_tree()]);
    ForestModel::new(ensemble, 3, "rich").unwrap()
}

pub fn platt() -> Box<dyn Calibrator> {
    Box::new(PlattCalibrator::new(-2.0, 0.25).unwrap())
}

pub fn pav() -> Box<dyn Calibrator> {
    Box::new(PavCalibrator::new(vec![-2.0, 0.0, 1.0], vec![-1.0, 0.5, 3.0], vec![0.1, 0.4, 0.9]).unwrap())
}

pub fn save(model: &CalibratedModel) -> Vec<u8> {
    let mut bytes = Vec::new();
    model.save(&mut bytes).unwrap();
    bytes
}

pub fn save_as(model: &CalibratedModel, version: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    model.save_as_version(&mut bytes, version).unwrap();
    bytes
}

/// Rows exercising every branch of the fixture trees, including missing values.
pub fn probe_rows() -> Vec<Vec<f32>> {
    vec![
        vec![0.0, 0.0, 0.0, 0.0],
        vec![0.0, 2.0, 1.0, 0.0],
        vec![1.0, 0.0, 3.0, 0.0],
        vec![3.0, 0.0, 2.0, 0.0],
        vec![f32::NAN, f32::NAN, f32::NAN, 0.0],
        vec![0.25],
    ]
}

/// Observable equality: same base model, calibrator presence and outputs.
pub fn assert_same_model(a: &CalibratedModel, b: &CalibratedModel) {
    assert_eq!(a.base(), b.base());
    assert_eq!(a.has_calibrator(), b.has_calibrator());
    for row in probe_rows() {
        assert_eq!(a.score(&row).to_bits(), b.score(&row).to_bits(), "row {row:?}");
        if a.has_calibrator() {
            assert_eq!(a.probability(&row).unwrap(), b.probability(&row).unwrap(), "row {row:?}");
        }
    }
}
