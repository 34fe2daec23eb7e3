//! Probability calibration of raw ensemble scores.
//!
//! A [`Calibrator`] maps a raw score to a probability. Calibrators persist as
//! nested blocks and are decoded through [`calibrator_registry`], keyed by
//! each calibrator's own loader signature.
//!
//! | Calibrator          | Fitted by                  | Mapping                       |
//! |---------------------|----------------------------|-------------------------------|
//! | [`PlattCalibrator`] | [`PlattCalibratorTrainer`] | `1 / (1 + exp(a * s + b))`    |
//! | [`PavCalibrator`]   | [`PavCalibratorTrainer`]   | isotonic step function        |

mod pav;
mod platt;

use std::fmt;
use std::sync::OnceLock;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

pub use pav::{PavCalibrator, PavCalibratorTrainer, PAV_VERSION};
pub use platt::{PlattCalibrator, PlattCalibratorTrainer, PLATT_VERSION};

use crate::error::{Error, Result};
use crate::io::{LoaderRegistry, Persist};
use crate::training::ConfigError;

/// Maps raw scores to probabilities.
pub trait Calibrator: Persist + Send + Sync + fmt::Debug {
    /// Probability in `[0, 1]` for a raw ensemble score.
    fn probability(&self, raw_score: f32) -> f32;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}

/// Fits a [`Calibrator`] from raw scores and binary labels.
pub trait CalibratorTrainer: Send + Sync + fmt::Debug {
    /// Fit on `scores[i]` with label `labels[i]` and optional weight.
    fn fit(&self, scores: &[f32], labels: &[bool], weights: Option<&[f32]>) -> Result<Box<dyn Calibrator>>;

    fn name(&self) -> &'static str;
}

/// Shared input checks for calibrator trainers.
pub(crate) fn check_fit_inputs(scores: &[f32], labels: &[bool], weights: Option<&[f32]>) -> Result<()> {
    if scores.is_empty() {
        return Err(ConfigError::EmptyCalibrationSet.into());
    }
    if labels.len() != scores.len() {
        return Err(Error::invalid_input(format!(
            "calibration scores ({}) and labels ({}) differ in length",
            scores.len(),
            labels.len()
        )));
    }
    if let Some(w) = weights {
        if w.len() != scores.len() {
            return Err(Error::invalid_input(format!(
                "calibration weights ({}) and scores ({}) differ in length",
                w.len(),
                scores.len()
            )));
        }
    }
    Ok(())
}

#[inline]
pub(crate) fn weight_at(weights: Option<&[f32]>, i: usize) -> f64 {
    weights.map_or(1.0, |w| w[i] as f64)
}

/// Registry holding every built-in calibrator.
pub fn builtin_calibrators() -> LoaderRegistry<dyn Calibrator> {
    LoaderRegistry::new()
        .with(&PLATT_VERSION, platt::load)
        .with(&PAV_VERSION, pav::load)
}

/// Process-wide calibrator registry, populated on first use.
pub fn calibrator_registry() -> &'static LoaderRegistry<dyn Calibrator> {
    static REGISTRY: OnceLock<LoaderRegistry<dyn Calibrator>> = OnceLock::new();
    REGISTRY.get_or_init(builtin_calibrators)
}

/// Pick at most `max` of `n` example indices for calibration.
///
/// Returns `0..n` when `n <= max`; otherwise `max` distinct indices drawn
/// with a generator seeded by `seed`, in ascending order.
pub fn subsample_for_calibration(n: usize, max: usize, seed: u64) -> Vec<usize> {
    if n <= max {
        return (0..n).collect();
    }
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, n, max).into_vec();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsample_is_identity_under_cap() {
        assert_eq!(subsample_for_calibration(4, 10, 1), vec![0, 1, 2, 3]);
        assert_eq!(subsample_for_calibration(4, 4, 1), vec![0, 1, 2, 3]);
    }

    #[test]
    fn subsample_is_deterministic_and_bounded() {
        let a = subsample_for_calibration(1000, 50, 7);
        let b = subsample_for_calibration(1000, 50, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|&i| i < 1000));
    }

    #[test]
    fn builtin_registry_knows_all_calibrators() {
        let reg = calibrator_registry();
        assert!(reg.contains(PLATT_VERSION.loader_signature));
        assert!(reg.contains(PAV_VERSION.loader_signature));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn fit_inputs_are_checked() {
        assert!(matches!(
            check_fit_inputs(&[], &[], None),
            Err(Error::Configuration(ConfigError::EmptyCalibrationSet))
        ));
        assert!(matches!(
            check_fit_inputs(&[0.0, 1.0], &[true], None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            check_fit_inputs(&[0.0], &[true], Some(&[1.0, 1.0])),
            Err(Error::InvalidInput(_))
        ));
        assert!(check_fit_inputs(&[0.0], &[true], Some(&[2.0])).is_ok());
    }
}
