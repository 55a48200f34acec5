//! Cost functions minimized by the split search.
//!
//! Gini and variance work directly on floating accumulators. Entropy is
//! evaluated through a per-trainer table of `x * log2(x)` at integer
//! multiples of `1 / multiplier`, where the multiplier is the smallest
//! integer that makes every class weight integral; this turns the hot
//! incremental updates into table lookups.

use serde::{Deserialize, Serialize};

use crate::constants::{FLOAT_ERROR, MAX_ENTROPY_MULTIPLIER};
use crate::core::dataset::Dataset;
use crate::error::{Result, TrainError};

/// Selector for the cost to minimize. The discriminants are part of the
/// public API and stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum CostFunction {
    Entropy = 1,
    Gini = 2,
    Variance = 3,
}

impl CostFunction {
    pub fn is_classification(&self) -> bool {
        matches!(self, CostFunction::Gini | CostFunction::Entropy)
    }
}

/// Gini impurity of a weighted class histogram, scaled by the node mass:
/// `sum(h * (W - h)) / W` with `W = sum(h)`.
pub(crate) fn gini_cost(histogram: &[f64]) -> f64 {
    let wnum_samples: f64 = histogram.iter().sum();
    if wnum_samples <= 0.0 {
        return 0.0;
    }
    histogram.iter().map(|&h| h * (wnum_samples - h)).sum::<f64>() / wnum_samples
}

/// Sum of squared residuals around the mean: `square_sum - sum^2 / n`.
pub(crate) fn variance_cost(sum: f64, square_sum: f64, num_samples: f64) -> f64 {
    if num_samples <= 0.0 {
        return 0.0;
    }
    square_sum - sum * sum / num_samples
}

/// Rounds a non-negative float to the nearest integer count.
pub(crate) fn round_count(x: f64) -> u32 {
    (x + 0.5) as u32
}

/// The entropy lookup table for one trainer.
///
/// Concurrent trainers each own their context, so table construction is
/// explicit and nothing is process-global.
#[derive(Debug)]
pub(crate) struct EntropyContext {
    multiplier: f64,
    table: Vec<f64>,
}

impl EntropyContext {
    /// Builds the table for a loaded dataset. Fails with `Unsupported`
    /// when no integer multiplier up to 100 approximates the class
    /// weights within the float error.
    pub fn new(dataset: &Dataset) -> Result<Self> {
        let multiplier = dataset
            .class_weight_multiplier(MAX_ENTROPY_MULTIPLIER)
            .ok_or_else(|| {
                TrainError::Unsupported(format!(
                    "entropy cost: no integer multiplier up to {} approximates the class weights within {}",
                    MAX_ENTROPY_MULTIPLIER, FLOAT_ERROR
                ))
            })?;
        let upper_bound = (dataset.meta().wnum_samples * multiplier).ceil() as usize + 1;
        let mut context = EntropyContext {
            multiplier,
            table: Vec::new(),
        };
        context.extend(upper_bound);
        Ok(context)
    }

    /// Grows the table up to `upper_bound` entries. Called when a larger
    /// integer-weighted sample count is observed.
    pub fn extend(&mut self, upper_bound: usize) {
        if upper_bound <= self.table.len() {
            return;
        }
        self.table.reserve(upper_bound - self.table.len());
        if self.table.is_empty() {
            self.table.push(0.0);
        }
        for idx in self.table.len()..upper_bound {
            let x = idx as f64 / self.multiplier;
            self.table.push(x * x.log2());
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// `x/m * log2(x/m)` for an integral argument.
    ///
    /// # Panics
    ///
    /// If `x` is outside the constructed range; the caller must never
    /// look past the weighted sample count of the root.
    #[inline]
    pub fn nlogn(&self, x: u32) -> f64 {
        self.table[x as usize]
    }

    /// `nlogn(x2) - nlogn(x1)`.
    #[inline]
    pub fn delta_nlogn(&self, x2: u32, x1: u32) -> f64 {
        self.nlogn(x2) - self.nlogn(x1)
    }

    /// Entropy of an integral histogram in table units:
    /// `nlogn(N) - sum(nlogn(h))`.
    pub fn entropy_cost(&self, histogram: &[u32]) -> f64 {
        let wnum_samples: u32 = histogram.iter().sum();
        histogram
            .iter()
            .fold(self.nlogn(wnum_samples), |cost, &h| cost - self.nlogn(h))
    }
}
