//! Random-forest trainer.

use ndarray::ArrayView2;

use super::grower::{BaggedTreeGrower, TreeGrower};
use super::labels::binary_labels;
use super::objective::RandomForestObjective;
use super::{CalibratorKind, ConfigError, FastForestConfig, TrainingSet};
use crate::calibration::{
    subsample_for_calibration, Calibrator, CalibratorTrainer, PavCalibratorTrainer, PlattCalibratorTrainer,
};
use crate::error::Result;
use crate::model::{CalibratedModel, ForestModel};
use crate::repr::TreeEnsemble;
use crate::utils::{run_with_threads, Parallelism};

/// Trains a [`CalibratedModel`] from a [`TrainingSet`].
///
/// Each of the `n_trees` rounds runs one full gradient pass, then hands the
/// gradients to the [`TreeGrower`]. The gradient target is fixed, so rounds
/// differ only through the grower's sampling. Leaf outputs are scaled by
/// `1 / n_trees` so the raw score is the forest mean. A calibrator is fitted
/// on the training scores afterwards, unless disabled.
#[derive(Debug)]
pub struct FastForestTrainer {
    config: FastForestConfig,
    grower: Box<dyn TreeGrower>,
}

impl FastForestTrainer {
    /// Trainer with the built-in [`BaggedTreeGrower`].
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if the configuration is invalid.
    pub fn new(config: FastForestConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let grower = Box::new(BaggedTreeGrower::from_config(&config));
        Ok(Self { config, grower })
    }

    /// Trainer with a caller-supplied grower.
    pub fn with_grower(
        config: FastForestConfig,
        grower: Box<dyn TreeGrower>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, grower })
    }

    pub fn config(&self) -> &FastForestConfig {
        &self.config
    }

    /// Train on `data`, using `config.n_threads` worker threads.
    pub fn train(&self, data: &TrainingSet) -> Result<CalibratedModel> {
        run_with_threads(self.config.n_threads, |parallelism| self.train_inner(data, parallelism))
    }

    fn train_inner(&self, data: &TrainingSet, parallelism: Parallelism) -> Result<CalibratedModel> {
        let config = &self.config;
        let features = data.features();

        let labels = binary_labels(data.ratings());
        let n_positive = labels.iter().filter(|&&l| l).count();
        tracing::info!(
            n_docs = data.n_docs(),
            n_features = data.n_features(),
            n_queries = data.queries().n_queries(),
            n_positive,
            "prepared labels"
        );

        let calibration = match self.calibrator_trainer() {
            Some(trainer) => Some((trainer, self.calibration_rows(data)?)),
            None => None,
        };

        let mut objective = RandomForestObjective::new(labels, data.queries().clone(), config.max_tree_output)?;
        let max_tree_output = objective.max_tree_output();
        let mut ensemble = TreeEnsemble::new();
        for tree_index in 0..config.n_trees {
            let gradients = objective.compute_gradients(parallelism);
            let tree = self.grower.grow(
                features,
                gradients,
                data.weights(),
                max_tree_output,
                tree_index,
            )?;
            tracing::debug!(tree_index, n_leaves = tree.n_leaves(), "tree grown");
            ensemble.push_tree(tree);
        }
        ensemble.scale_leaves(1.0 / config.n_trees as f32);

        let base = ForestModel::new(ensemble, data.n_features(), config.to_options_string())?;
        let calibrator = match calibration {
            Some((trainer, rows)) => {
                Some(fit_calibrator(trainer.as_ref(), &base, data, &rows, objective.labels(), parallelism)?)
            }
            None => None,
        };
        tracing::info!(
            n_trees = config.n_trees,
            calibrator = calibrator.as_ref().map_or("none", |c| c.name()),
            "training complete"
        );
        Ok(CalibratedModel::new(base, calibrator))
    }

    fn calibrator_trainer(&self) -> Option<Box<dyn CalibratorTrainer>> {
        match self.config.calibrator {
            CalibratorKind::None => None,
            CalibratorKind::Platt => Some(Box::new(PlattCalibratorTrainer::default())),
            CalibratorKind::Pav => Some(Box::new(PavCalibratorTrainer)),
        }
    }

    /// Rows the calibrator is fitted on. Drawn before any tree is grown so an
    /// unusable subsample fails early.
    fn calibration_rows(&self, data: &TrainingSet) -> Result<Vec<usize>> {
        let rows = subsample_for_calibration(data.n_docs(), self.config.max_calibration_examples, self.config.seed);
        if let Some(weights) = data.weights() {
            if !rows.iter().any(|&r| weights[r] > 0.0) {
                return Err(ConfigError::ZeroTotalWeight {
                    what: "calibration examples",
                }
                .into());
            }
        }
        if rows.len() < data.n_docs() {
            tracing::info!(
                n_docs = data.n_docs(),
                n_used = rows.len(),
                "subsampled calibration examples"
            );
        }
        Ok(rows)
    }
}

fn fit_calibrator(
    trainer: &dyn CalibratorTrainer,
    base: &ForestModel,
    data: &TrainingSet,
    rows: &[usize],
    labels: &[bool],
    parallelism: Parallelism,
) -> Result<Box<dyn Calibrator>> {
    let features = data.features();
    let scores = parallelism.maybe_par_map(rows, |&r| score_row(base, features, r));
    let sub_labels: Vec<bool> = rows.iter().map(|&r| labels[r]).collect();
    let sub_weights: Option<Vec<f32>> = data.weights().map(|w| rows.iter().map(|&r| w[r]).collect());

    let calibrator = trainer.fit(&scores, &sub_labels, sub_weights.as_deref())?;
    tracing::debug!(calibrator = trainer.name(), n_examples = rows.len(), "fitted calibrator");
    Ok(calibrator)
}

fn score_row(base: &ForestModel, features: ArrayView2<'_, f32>, row: usize) -> f32 {
    let view = features.row(row);
    match view.as_slice() {
        Some(values) => base.predict_row(values),
        None => base.predict_row(&view.to_vec()),
    }
}
