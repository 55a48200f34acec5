//! Cached per-node statistics.
//!
//! Computed once on a node's first visit and read by the split search,
//! the leaf emitter and the splittability checks.

use crate::cost::{self, EntropyContext};
use crate::core::subset::Subset;

#[derive(Debug)]
pub(crate) enum NodeStats {
    Classification {
        /// `histogram[c] = sum(sample_weight * class_weight[c])` over the
        /// node's samples of class `c`.
        histogram: Vec<f64>,
        wnum_samples: f64,
        cost: f64,
    },
    Regression {
        num_samples: f64,
        sum: f64,
        square_sum: f64,
        cost: f64,
    },
}

impl NodeStats {
    pub fn classification(
        subset: &Subset,
        num_classes: usize,
        class_weights: &[f64],
        entropy: Option<&EntropyContext>,
    ) -> NodeStats {
        let labels = subset.labels().as_int();
        let weights = subset.sample_weights();
        let mut histogram = vec![0.0; num_classes];
        for (&label, &weight) in labels.iter().zip(weights.iter()) {
            histogram[label as usize] += weight as f64 * class_weights[label as usize];
        }
        let wnum_samples: f64 = histogram.iter().sum();
        let cost = match entropy {
            None => cost::gini_cost(&histogram),
            Some(context) => {
                let integral: Vec<u32> = histogram
                    .iter()
                    .map(|&h| cost::round_count(h * context.multiplier()))
                    .collect();
                context.entropy_cost(&integral)
            }
        };
        NodeStats::Classification {
            histogram,
            wnum_samples,
            cost,
        }
    }

    pub fn regression(subset: &Subset) -> NodeStats {
        let labels = subset.labels().as_float();
        let weights = subset.sample_weights();
        let mut num_samples = 0.0;
        let mut sum = 0.0;
        let mut square_sum = 0.0;
        for (&label, &weight) in labels.iter().zip(weights.iter()) {
            let weight = weight as f64;
            num_samples += weight;
            sum += weight * label;
            square_sum += weight * label * label;
        }
        let cost = cost::variance_cost(sum, square_sum, num_samples);
        NodeStats::Regression {
            num_samples,
            sum,
            square_sum,
            cost,
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            NodeStats::Classification { cost, .. } => *cost,
            NodeStats::Regression { cost, .. } => *cost,
        }
    }

    /// The count checked against `min_split_node`: weighted for
    /// classification, plain for regression.
    pub fn split_count(&self) -> f64 {
        match self {
            NodeStats::Classification { wnum_samples, .. } => *wnum_samples,
            NodeStats::Regression { num_samples, .. } => *num_samples,
        }
    }

    pub fn histogram(&self) -> &[f64] {
        match self {
            NodeStats::Classification { histogram, .. } => histogram,
            NodeStats::Regression { .. } => unreachable!("histogram of a regression node"),
        }
    }

    /// Classification leaf payload: the normalized histogram.
    pub fn probability(&self) -> Vec<f64> {
        let mut probability = self.histogram().to_vec();
        crate::utils::helpers::normalize(&mut probability);
        probability
    }

    /// Regression leaf payload: the weighted mean label.
    pub fn mean(&self) -> f64 {
        match self {
            NodeStats::Regression { num_samples, sum, .. } => sum / num_samples,
            NodeStats::Classification { .. } => unreachable!("mean of a classification node"),
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;
    use crate::core::column::{FeatureColumn, FeatureKind, LabelColumn};
    use crate::core::dataset::Dataset;

    #[test]
    fn test_classification_stats() {
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::F32(vec![0.0; 4]), FeatureKind::Continuous)
            .unwrap();
        dataset.add_label(LabelColumn::Int(vec![0, 0, 1, 1])).unwrap();
        dataset.add_class_weights(vec![1.0, 2.0]).unwrap();
        dataset.add_sample_weights(vec![1, 2, 1, 1]).unwrap();
        let root = Subset::make_root(&dataset);
        let stats = NodeStats::classification(&root, 2, dataset.class_weights(), None);

        assert!(approx_eq!(f64, stats.histogram()[0], 3.0));
        assert!(approx_eq!(f64, stats.histogram()[1], 4.0));
        assert!(approx_eq!(f64, stats.split_count(), 7.0));
        // Gini: 3*4/7 + 4*3/7.
        assert!(approx_eq!(f64, stats.cost(), 24.0 / 7.0, epsilon = 1e-12));

        let probability = stats.probability();
        assert!(approx_eq!(f64, probability[0], 3.0 / 7.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, probability[1], 4.0 / 7.0, epsilon = 1e-12));
    }

    #[test]
    fn test_regression_stats() {
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::F32(vec![0.0; 3]), FeatureKind::Continuous)
            .unwrap();
        dataset
            .add_label(LabelColumn::Float(vec![1.0, 3.0, 5.0]))
            .unwrap();
        dataset.add_sample_weights(vec![1, 1, 2]).unwrap();
        let root = Subset::make_root(&dataset);
        let stats = NodeStats::regression(&root);

        assert!(approx_eq!(f64, stats.split_count(), 4.0));
        assert!(approx_eq!(f64, stats.mean(), 14.0 / 4.0));
        // square_sum 60, sum 14, n 4 -> 60 - 49 = 11.
        assert!(approx_eq!(f64, stats.cost(), 11.0, epsilon = 1e-12));
    }
}
