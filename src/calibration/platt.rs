//! Platt (sigmoid) calibration.

use super::{check_fit_inputs, weight_at, Calibrator, CalibratorTrainer};
use crate::error::{Error, Result};
use crate::io::{ModelHeader, ModelReader, ModelWriter, Persist, VersionInfo};

pub const PLATT_VERSION: VersionInfo =
    VersionInfo::new(b"PLATTCAL", 0x0001_0001, 0x0001_0001, 0x0001_0001, "PlattCaliExec");

/// Sigmoid calibrator: `p = 1 / (1 + exp(slope * score + offset))`.
///
/// A fitted slope is negative when higher scores mean "more positive".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlattCalibrator {
    slope: f64,
    offset: f64,
}

impl PlattCalibrator {
    /// Create a calibrator. Both parameters must be finite.
    pub fn new(slope: f64, offset: f64) -> Result<Self> {
        if !(slope.is_finite() && offset.is_finite()) {
            return Err(Error::invalid_input(format!(
                "Platt parameters must be finite, got slope={slope}, offset={offset}"
            )));
        }
        Ok(Self { slope, offset })
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

impl Calibrator for PlattCalibrator {
    fn probability(&self, raw_score: f32) -> f32 {
        let z = self.slope.mul_add(raw_score as f64, self.offset);
        (1.0 / (1.0 + z.exp())) as f32
    }

    fn name(&self) -> &'static str {
        "platt"
    }
}

impl Persist for PlattCalibrator {
    fn version_info(&self) -> &'static VersionInfo {
        &PLATT_VERSION
    }

    fn write_body(&self, writer: &mut ModelWriter<'_>, _version: u32) -> Result<()> {
        writer.write_f64(self.slope)?;
        writer.write_f64(self.offset)
    }
}

pub(super) fn load(reader: &mut ModelReader<'_>, _header: &ModelHeader) -> Result<Box<dyn Calibrator>> {
    let slope = reader.read_f64()?;
    let offset = reader.read_f64()?;
    let calibrator = PlattCalibrator::new(slope, offset).map_err(|e| Error::corrupt(e.to_string()))?;
    Ok(Box::new(calibrator))
}

// =============================================================================
// Trainer
// =============================================================================

/// Fits [`PlattCalibrator`] by Newton's method with backtracking line search
/// on the regularized log-likelihood (Platt 1999, Lin et al. 2007). Targets
/// are smoothed to `(N+ + 1) / (N+ + 2)` and `1 / (N- + 2)`.
#[derive(Debug, Clone, Copy)]
pub struct PlattCalibratorTrainer {
    pub max_iterations: usize,
    pub min_step: f64,
    pub tolerance: f64,
}

impl Default for PlattCalibratorTrainer {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            min_step: 1e-10,
            tolerance: 1e-5,
        }
    }
}

/// Negative log-likelihood term for one example, evaluated stably.
#[inline]
fn nll(f_apb: f64, target: f64) -> f64 {
    if f_apb >= 0.0 {
        target * f_apb + (-f_apb).exp().ln_1p()
    } else {
        (target - 1.0) * f_apb + f_apb.exp().ln_1p()
    }
}

impl CalibratorTrainer for PlattCalibratorTrainer {
    fn fit(&self, scores: &[f32], labels: &[bool], weights: Option<&[f32]>) -> Result<Box<dyn Calibrator>> {
        check_fit_inputs(scores, labels, weights)?;

        let (mut prior1, mut prior0) = (0.0f64, 0.0f64);
        for (i, &label) in labels.iter().enumerate() {
            let w = weight_at(weights, i);
            if label {
                prior1 += w;
            } else {
                prior0 += w;
            }
        }
        let hi = (prior1 + 1.0) / (prior1 + 2.0);
        let lo = 1.0 / (prior0 + 2.0);
        let target = |i: usize| if labels[i] { hi } else { lo };
        let objective = |a: f64, b: f64| -> f64 {
            scores
                .iter()
                .enumerate()
                .map(|(i, &s)| weight_at(weights, i) * nll(s as f64 * a + b, target(i)))
                .sum()
        };

        const SIGMA: f64 = 1e-12;
        let mut a = 0.0f64;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = objective(a, b);

        for _ in 0..self.max_iterations {
            let (mut h11, mut h22, mut h21) = (SIGMA, SIGMA, 0.0f64);
            let (mut g1, mut g2) = (0.0f64, 0.0f64);
            for (i, &s) in scores.iter().enumerate() {
                let s = s as f64;
                let w = weight_at(weights, i);
                let f_apb = s * a + b;
                let (p, q) = if f_apb >= 0.0 {
                    let e = (-f_apb).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = f_apb.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = w * p * q;
                h11 += s * s * d2;
                h22 += d2;
                h21 += s * d2;
                let d1 = w * (target(i) - p);
                g1 += s * d1;
                g2 += d1;
            }
            if g1.abs() < self.tolerance && g2.abs() < self.tolerance {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0f64;
            let mut accepted = false;
            while step >= self.min_step {
                let (na, nb) = (a + step * da, b + step * db);
                let nf = objective(na, nb);
                if nf < fval + 1e-4 * step * gd {
                    a = na;
                    b = nb;
                    fval = nf;
                    accepted = true;
                    break;
                }
                step /= 2.0;
            }
            if !accepted {
                tracing::debug!("Platt line search stopped making progress");
                break;
            }
        }

        tracing::debug!(slope = a, offset = b, "fitted Platt calibrator");
        Ok(Box::new(PlattCalibrator::new(a, b)?))
    }

    fn name(&self) -> &'static str {
        "platt"
    }
}
