//! The columnar `Dataset` and its metadata.
//!
//! The dataset is read-only during training and shared by every worker
//! thread. It is assembled by chaining `add_feature`, `add_label`,
//! `add_class_weights` and `add_sample_weights`; a sample weight of zero
//! means the sample is not part of the training set (bagging uses this
//! for out-of-bag samples).

use crate::constants::FLOAT_ERROR;
use crate::core::column::{FeatureColumn, FeatureKind, LabelColumn};
use crate::cost::CostFunction;
use crate::error::{Result, TrainError};

/// Per-dataset bookkeeping kept alongside the columns.
#[derive(Debug, Clone, Default)]
pub struct MetaData {
    /// Number of rows in the input columns.
    pub size: usize,
    /// Sum of sample weights.
    pub num_samples: u64,
    pub num_features: usize,
    /// Cardinality per feature, zero for continuous features.
    pub num_bins: Vec<u32>,
    pub max_num_bins: u32,
    pub num_classes: usize,
    /// `sum(sample_weights[i] * class_weights[labels[i]])`; classification
    /// only, zero otherwise.
    pub wnum_samples: f64,
}

#[derive(Debug, Default)]
pub struct Dataset {
    features: Vec<FeatureColumn>,
    kinds: Vec<FeatureKind>,
    labels: Option<LabelColumn>,
    sample_weights: Vec<u32>,
    class_weights: Vec<f64>,
    meta: MetaData,
}

impl Dataset {
    pub fn new() -> Self {
        Dataset::default()
    }

    /// Appends a feature column with its split tag.
    ///
    /// The first column fixes the dataset size; later columns must match
    /// it. Discrete tags require integral columns and continuous tags
    /// require floating ones.
    pub fn add_feature(&mut self, column: FeatureColumn, kind: FeatureKind) -> Result<()> {
        if column.is_empty() {
            return Err(TrainError::InvalidInput("empty feature column".to_string()));
        }
        if self.meta.size == 0 {
            self.meta.size = column.len();
        } else if column.len() != self.meta.size {
            return Err(TrainError::InvalidInput(format!(
                "feature column length {} does not match dataset size {}",
                column.len(),
                self.meta.size
            )));
        }
        if kind.is_discrete() != column.is_discrete() {
            return Err(TrainError::InvalidInput(
                "feature tag does not match the column type".to_string(),
            ));
        }
        if !column.is_finite() {
            return Err(TrainError::InvalidInput(
                "continuous feature contains non-finite values".to_string(),
            ));
        }

        let num_bins = column.cardinality().unwrap_or(0);
        self.meta.num_bins.push(num_bins);
        if num_bins > self.meta.max_num_bins {
            self.meta.max_num_bins = num_bins;
        }
        self.meta.num_features += 1;
        self.features.push(column);
        self.kinds.push(kind);
        Ok(())
    }

    /// Sets the label column. Integral labels are class ids `0..K-1`.
    pub fn add_label(&mut self, column: LabelColumn) -> Result<()> {
        if column.is_empty() {
            return Err(TrainError::InvalidInput("empty label column".to_string()));
        }
        if self.meta.size != 0 && column.len() != self.meta.size {
            return Err(TrainError::InvalidInput(format!(
                "label column length {} does not match dataset size {}",
                column.len(),
                self.meta.size
            )));
        }
        if self.meta.size == 0 {
            self.meta.size = column.len();
        }
        self.meta.num_classes = column.num_classes().unwrap_or(0);
        self.labels = Some(column);
        Ok(())
    }

    /// Sets per-sample weights. A weight of zero drops the sample from
    /// training.
    pub fn add_sample_weights(&mut self, sample_weights: Vec<u32>) -> Result<()> {
        if sample_weights.len() != self.meta.size {
            return Err(TrainError::InvalidInput(format!(
                "sample weights length {} does not match dataset size {}",
                sample_weights.len(),
                self.meta.size
            )));
        }
        self.meta.num_samples = sample_weights.iter().map(|&w| w as u64).sum();
        self.sample_weights = sample_weights;
        if !self.class_weights.is_empty() {
            self.meta.wnum_samples = self.compute_wnum_samples();
        }
        Ok(())
    }

    /// Sets all sample weights to one.
    pub fn add_default_sample_weights(&mut self) -> Result<()> {
        self.add_sample_weights(vec![1; self.meta.size])
    }

    /// Sets per-class weights (classification only); the weighted sample
    /// count of every node is measured in these units.
    pub fn add_class_weights(&mut self, class_weights: Vec<f64>) -> Result<()> {
        if class_weights.len() != self.meta.num_classes {
            return Err(TrainError::InvalidInput(format!(
                "class weights length {} does not match {} classes",
                class_weights.len(),
                self.meta.num_classes
            )));
        }
        if class_weights.iter().any(|&w| !(w > 0.0) || !w.is_finite()) {
            return Err(TrainError::InvalidInput(
                "class weights must be positive and finite".to_string(),
            ));
        }
        self.class_weights = class_weights;
        if !self.sample_weights.is_empty() {
            self.meta.wnum_samples = self.compute_wnum_samples();
        }
        Ok(())
    }

    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    pub fn feature(&self, feature_idx: usize) -> &FeatureColumn {
        &self.features[feature_idx]
    }

    pub fn feature_kind(&self, feature_idx: usize) -> FeatureKind {
        self.kinds[feature_idx]
    }

    /// # Panics
    ///
    /// If no label column has been added.
    pub fn labels(&self) -> &LabelColumn {
        self.labels.as_ref().expect("dataset has no labels")
    }

    pub fn sample_weights(&self) -> &[u32] {
        &self.sample_weights
    }

    pub fn class_weights(&self) -> &[f64] {
        &self.class_weights
    }

    /// Checks that the dataset conforms to the selected cost function.
    /// Called once before any training job is scheduled.
    pub(crate) fn validate(&self, cost_function: CostFunction) -> Result<()> {
        if self.features.is_empty() {
            return Err(TrainError::InvalidInput("dataset has no features".to_string()));
        }
        let labels = self
            .labels
            .as_ref()
            .ok_or_else(|| TrainError::InvalidInput("dataset has no labels".to_string()))?;
        if self.sample_weights.is_empty() {
            return Err(TrainError::InvalidInput("dataset has no sample weights".to_string()));
        }
        if self.meta.num_samples == 0 {
            return Err(TrainError::InvalidInput("all sample weights are zero".to_string()));
        }
        match cost_function {
            CostFunction::Gini | CostFunction::Entropy => {
                if !labels.is_integral() {
                    return Err(TrainError::InvalidInput(
                        "classification cost requires integral labels".to_string(),
                    ));
                }
                if self.class_weights.is_empty() {
                    return Err(TrainError::InvalidInput(
                        "classification cost requires class weights".to_string(),
                    ));
                }
            }
            CostFunction::Variance => {
                if labels.is_integral() {
                    return Err(TrainError::InvalidInput(
                        "variance cost requires floating labels".to_string(),
                    ));
                }
                if labels.as_float().iter().any(|y| !y.is_finite()) {
                    return Err(TrainError::InvalidInput(
                        "labels contain non-finite values".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn compute_wnum_samples(&self) -> f64 {
        match &self.labels {
            Some(LabelColumn::Int(labels)) => labels
                .iter()
                .zip(self.sample_weights.iter())
                .map(|(&label, &weight)| weight as f64 * self.class_weights[label as usize])
                .sum(),
            _ => 0.0,
        }
    }

    /// Finds the smallest integer multiplier that makes every class
    /// weight integral within the float error. The entropy cost table is
    /// indexed at integer multiples of `1 / multiplier`.
    pub(crate) fn class_weight_multiplier(&self, max_multiplier: f64) -> Option<f64> {
        let mut multiplier = 1.0;
        while multiplier <= max_multiplier {
            let valid = self.class_weights.iter().all(|&weight| {
                let approximated = (weight * multiplier).round() / multiplier;
                (approximated - weight).abs() <= FLOAT_ERROR
            });
            if valid {
                return Some(multiplier);
            }
            multiplier += 1.0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_class_dataset() -> Dataset {
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::F32(vec![0.1, 0.2, 0.8, 0.9]), FeatureKind::Continuous)
            .unwrap();
        dataset.add_label(LabelColumn::Int(vec![0, 0, 1, 1])).unwrap();
        dataset.add_class_weights(vec![1.0, 1.0]).unwrap();
        dataset.add_default_sample_weights().unwrap();
        dataset
    }

    #[test]
    fn test_meta() {
        let dataset = two_class_dataset();
        assert_eq!(dataset.meta().size, 4);
        assert_eq!(dataset.meta().num_samples, 4);
        assert_eq!(dataset.meta().num_classes, 2);
        assert_eq!(dataset.meta().num_bins, vec![0]);
        assert!((dataset.meta().wnum_samples - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::F32(vec![0.1, 0.2]), FeatureKind::Continuous)
            .unwrap();
        assert!(dataset
            .add_feature(FeatureColumn::F32(vec![0.1]), FeatureKind::Continuous)
            .is_err());
        assert!(dataset.add_label(LabelColumn::Int(vec![0])).is_err());
    }

    #[test]
    fn test_tag_type_mismatch_rejected() {
        let mut dataset = Dataset::new();
        assert!(dataset
            .add_feature(FeatureColumn::F32(vec![0.5]), FeatureKind::Ordinal)
            .is_err());
        assert!(dataset
            .add_feature(FeatureColumn::U8(vec![1]), FeatureKind::Continuous)
            .is_err());
    }

    #[test]
    fn test_validate_label_kind() {
        let dataset = two_class_dataset();
        assert!(dataset.validate(CostFunction::Gini).is_ok());
        assert!(dataset.validate(CostFunction::Variance).is_err());
    }

    #[test]
    fn test_class_weight_multiplier() {
        let mut dataset = two_class_dataset();
        assert_eq!(dataset.class_weight_multiplier(100.0), Some(1.0));
        dataset.add_class_weights(vec![0.5, 1.5]).unwrap();
        assert_eq!(dataset.class_weight_multiplier(100.0), Some(2.0));
        dataset.add_class_weights(vec![1.0 / 3.0, 1.0]).unwrap();
        assert_eq!(dataset.class_weight_multiplier(100.0), Some(3.0));
        dataset
            .add_class_weights(vec![std::f64::consts::SQRT_2 / 2.0, 1.0])
            .unwrap();
        assert_eq!(dataset.class_weight_multiplier(100.0), None);
    }
}
