//! Isotonic calibration via pool-adjacent-violators.

use super::{check_fit_inputs, weight_at, Calibrator, CalibratorTrainer};
use crate::error::{Error, Result};
use crate::io::{ModelHeader, ModelReader, ModelWriter, Persist, VersionInfo};

pub const PAV_VERSION: VersionInfo =
    VersionInfo::new(b"PAV  CAL", 0x0001_0001, 0x0001_0001, 0x0001_0001, "PAVCaliExec");

/// Piecewise-constant, non-decreasing map from score to probability.
///
/// Bin `i` covers `[mins[i], maxes[i]]` and maps to `values[i]`. Scores
/// between two bins interpolate linearly between their values; scores outside
/// all bins take the nearest end value.
#[derive(Debug, Clone, PartialEq)]
pub struct PavCalibrator {
    mins: Vec<f32>,
    maxes: Vec<f32>,
    values: Vec<f32>,
}

impl PavCalibrator {
    /// Create a calibrator from sorted, disjoint bins with non-decreasing
    /// values in `[0, 1]`.
    pub fn new(mins: Vec<f32>, maxes: Vec<f32>, values: Vec<f32>) -> Result<Self> {
        let n = mins.len();
        if n == 0 || maxes.len() != n || values.len() != n {
            return Err(Error::invalid_input(format!(
                "PAV bins must be non-empty and equal length (mins {}, maxes {}, values {})",
                n,
                maxes.len(),
                values.len()
            )));
        }
        for i in 0..n {
            let bin_ok = mins[i].is_finite() && maxes[i].is_finite() && mins[i] <= maxes[i];
            let value_ok = (0.0..=1.0).contains(&values[i]);
            let ordered = i == 0 || (maxes[i - 1] < mins[i] && values[i - 1] <= values[i]);
            if !(bin_ok && value_ok && ordered) {
                return Err(Error::invalid_input(format!("PAV bin {i} is out of order or out of range")));
            }
        }
        Ok(Self { mins, maxes, values })
    }

    pub fn n_bins(&self) -> usize {
        self.values.len()
    }
}

impl Calibrator for PavCalibrator {
    fn probability(&self, raw_score: f32) -> f32 {
        if raw_score.is_nan() {
            return self.values[0];
        }
        // first bin whose max is >= score
        let idx = self.maxes.partition_point(|&m| m < raw_score);
        if idx == self.values.len() {
            return self.values[idx - 1];
        }
        if raw_score >= self.mins[idx] || idx == 0 {
            return self.values[idx];
        }
        let (x0, x1) = (self.maxes[idx - 1], self.mins[idx]);
        let (y0, y1) = (self.values[idx - 1], self.values[idx]);
        y0 + (y1 - y0) * (raw_score - x0) / (x1 - x0)
    }

    fn name(&self) -> &'static str {
        "pav"
    }
}

impl Persist for PavCalibrator {
    fn version_info(&self) -> &'static VersionInfo {
        &PAV_VERSION
    }

    fn write_body(&self, writer: &mut ModelWriter<'_>, _version: u32) -> Result<()> {
        writer.write_f32_slice(&self.mins)?;
        writer.write_f32_slice(&self.maxes)?;
        writer.write_f32_slice(&self.values)
    }
}

pub(super) fn load(reader: &mut ModelReader<'_>, _header: &ModelHeader) -> Result<Box<dyn Calibrator>> {
    let mins = reader.read_f32_vec()?;
    let maxes = reader.read_f32_vec()?;
    let values = reader.read_f32_vec()?;
    let calibrator = PavCalibrator::new(mins, maxes, values).map_err(|e| Error::corrupt(e.to_string()))?;
    Ok(Box::new(calibrator))
}

// =============================================================================
// Trainer
// =============================================================================

/// Fits [`PavCalibrator`] with the pool-adjacent-violators algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct PavCalibratorTrainer;

#[derive(Debug, Clone, Copy)]
struct Block {
    min: f32,
    max: f32,
    positive: f64,
    weight: f64,
}

impl Block {
    fn mean(&self) -> f64 {
        self.positive / self.weight
    }
}

impl CalibratorTrainer for PavCalibratorTrainer {
    fn fit(&self, scores: &[f32], labels: &[bool], weights: Option<&[f32]>) -> Result<Box<dyn Calibrator>> {
        check_fit_inputs(scores, labels, weights)?;

        let mut order: Vec<usize> = (0..scores.len())
            .filter(|&i| scores[i].is_finite() && weight_at(weights, i) > 0.0)
            .collect();
        if order.is_empty() {
            return Err(Error::invalid_input(
                "no finite, positively weighted calibration examples",
            ));
        }
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        let mut stack: Vec<Block> = Vec::with_capacity(order.len());
        for &i in &order {
            let w = weight_at(weights, i);
            let mut block = Block {
                min: scores[i],
                max: scores[i],
                positive: if labels[i] { w } else { 0.0 },
                weight: w,
            };
            // equal scores must share a bin
            if let Some(top) = stack.last_mut() {
                if top.max == block.min {
                    block = Block {
                        min: top.min,
                        max: block.max,
                        positive: top.positive + block.positive,
                        weight: top.weight + block.weight,
                    };
                    stack.pop();
                }
            }
            while let Some(top) = stack.last() {
                if top.mean() < block.mean() {
                    break;
                }
                block = Block {
                    min: top.min,
                    max: block.max,
                    positive: top.positive + block.positive,
                    weight: top.weight + block.weight,
                };
                stack.pop();
            }
            stack.push(block);
        }

        let mins = stack.iter().map(|b| b.min).collect();
        let maxes = stack.iter().map(|b| b.max).collect();
        let values = stack.iter().map(|b| b.mean().clamp(0.0, 1.0) as f32).collect();
        tracing::debug!(n_bins = stack.len(), "fitted PAV calibrator");
        Ok(Box::new(PavCalibrator::new(mins, maxes, values)?))
    }

    fn name(&self) -> &'static str {
        "pav"
    }
}
