//! Regression split state.
//!
//! Keeps running sums and squared sums for the two sides of a candidate
//! split; the variance cost of any configuration is
//! `square_sum - sum_l^2/n_l - sum_r^2/n_r`, so one subtraction and one
//! addition per moved sample keep the cost current.
//!
//! Many-vs-many regression splits always go through the mean-ordered
//! linear walk, so the brute-force and greedy bin moves have no meaning
//! here and are unreachable.

use rand::Rng;

use crate::core::column::LabelColumn;
use crate::core::dataset::MetaData;
use crate::core::stats::NodeStats;
use crate::split::splitter::SplitState;

#[derive(Debug)]
pub(crate) struct RegState {
    min_leaf_node: f64,

    sum: f64,
    sum_left: f64,
    sum_right: f64,
    square_sum: f64,

    binwise_sum: Vec<f64>,
    binwise_num: Vec<f64>,
    bin_ids: Vec<u32>,
    means: Vec<f64>,

    num_samples: f64,
    num_left: f64,
    num_right: f64,
    num_bins: u32,
}

impl RegState {
    pub fn new(meta: &MetaData, min_leaf_node: u32) -> Self {
        let max_num_bins = meta.max_num_bins as usize;
        RegState {
            min_leaf_node: min_leaf_node as f64,
            sum: 0.0,
            sum_left: 0.0,
            sum_right: 0.0,
            square_sum: 0.0,
            binwise_sum: vec![0.0; max_num_bins],
            binwise_num: vec![0.0; max_num_bins],
            bin_ids: vec![0; max_num_bins],
            means: vec![0.0; max_num_bins],
            num_samples: 0.0,
            num_left: 0.0,
            num_right: 0.0,
            num_bins: 0,
        }
    }

    fn cost(&self, sum_left: f64, sum_right: f64, num_left: f64, num_right: f64) -> f64 {
        self.square_sum - sum_left * sum_left / num_left - sum_right * sum_right / num_right
    }

    fn seed_from_stats(&mut self, stats: &NodeStats) {
        match stats {
            NodeStats::Regression {
                num_samples,
                sum,
                square_sum,
                ..
            } => {
                self.num_samples = *num_samples;
                self.sum = *sum;
                self.square_sum = *square_sum;
            }
            NodeStats::Classification { .. } => unreachable!("regression state on a classification node"),
        }
        self.sum_left = self.sum;
        self.sum_right = 0.0;
        self.num_left = self.num_samples;
        self.num_right = 0.0;
    }
}

impl SplitState for RegState {
    type Label = f64;

    fn borrow_labels(labels: &LabelColumn) -> &[f64] {
        labels.as_float()
    }

    fn numerical_init(&mut self, stats: &NodeStats) {
        self.seed_from_stats(stats);
    }

    fn move_one_sample(&mut self, label: f64, sample_weight: u32) -> f64 {
        let sample_weight = sample_weight as f64;
        self.num_left -= sample_weight;
        self.num_right += sample_weight;
        let weighted_label = label * sample_weight;
        self.sum_left -= weighted_label;
        self.sum_right += weighted_label;
        self.cost(self.sum_left, self.sum_right, self.num_left, self.num_right)
    }

    fn discrete_init(
        &mut self,
        bins: &[u32],
        labels: &[f64],
        sample_weights: &[u32],
        feature_num_bins: u32,
        stats: &NodeStats,
    ) {
        for ((&bin, &label), &sample_weight) in bins.iter().zip(labels.iter()).zip(sample_weights.iter()) {
            let sample_weight = sample_weight as f64;
            self.binwise_sum[bin as usize] += label * sample_weight;
            self.binwise_num[bin as usize] += sample_weight;
        }
        for bin in 0..feature_num_bins {
            if self.binwise_num[bin as usize] > 0.0 {
                self.bin_ids[self.num_bins as usize] = bin;
                self.num_bins += 1;
            }
        }
        self.seed_from_stats(stats);
    }

    fn clear(&mut self) {
        for idx in 0..self.num_bins as usize {
            let bin = self.bin_ids[idx] as usize;
            self.binwise_sum[bin] = 0.0;
            self.binwise_num[bin] = 0.0;
        }
        self.num_bins = 0;
    }

    fn move_one_bin_l2r(&mut self, bin: u32) -> f64 {
        let bin = bin as usize;
        self.num_left -= self.binwise_num[bin];
        self.num_right += self.binwise_num[bin];
        self.sum_left -= self.binwise_sum[bin];
        self.sum_right += self.binwise_sum[bin];
        self.cost(self.sum_left, self.sum_right, self.num_left, self.num_right)
    }

    fn move_one_bin_r2l(&mut self, _bin: u32) -> f64 {
        unreachable!("regression splits never walk bins right to left")
    }

    fn set_one_vs_all(&mut self, bin: u32) -> f64 {
        let bin = bin as usize;
        self.num_left = self.binwise_num[bin];
        self.num_right = self.num_samples - self.num_left;
        self.sum_left = self.binwise_sum[bin];
        self.sum_right = self.sum - self.sum_left;
        self.cost(self.sum_left, self.sum_right, self.num_left, self.num_right)
    }

    fn reorder_bin_ids(&mut self) {
        for idx in 0..self.num_bins as usize {
            let bin = self.bin_ids[idx] as usize;
            self.means[bin] = self.binwise_sum[bin] / self.binwise_num[bin];
        }
        let means = &self.means;
        self.bin_ids[..self.num_bins as usize]
            .sort_by(|&x, &y| means[x as usize].partial_cmp(&means[y as usize]).unwrap());
    }

    fn move_one_bin_out_of_place(&mut self, _bin: u32) -> f64 {
        unreachable!("regression splits never sample bins")
    }

    fn move_one_bin_in_place(&mut self, _bin: u32) {
        unreachable!("regression splits never sample bins")
    }

    fn below_min_leaf(&self) -> bool {
        self.num_left < self.min_leaf_node || self.num_right < self.min_leaf_node
    }

    fn num_bins(&self) -> u32 {
        self.num_bins
    }

    fn bin_id(&self, idx: u32) -> u32 {
        self.bin_ids[idx as usize]
    }

    fn shuffle_bin_ids<R: Rng>(&mut self, _rng: &mut R, _n: u32, _k: u32) {
        unreachable!("regression splits never sample bins")
    }

    fn switch_with_last(&mut self, _idx: u32, _num_bins: u32) {
        unreachable!("regression splits never sample bins")
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;
    use crate::core::column::{FeatureColumn, FeatureKind, LabelColumn};
    use crate::core::dataset::Dataset;
    use crate::core::subset::Subset;

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::F64(vec![0.1, 0.2, 0.8, 0.9]), FeatureKind::Continuous)
            .unwrap();
        dataset
            .add_label(LabelColumn::Float(vec![1.0, 1.0, 3.0, 3.0]))
            .unwrap();
        dataset.add_default_sample_weights().unwrap();
        dataset
    }

    #[test]
    fn test_move_one_sample_reaches_pure_split() {
        let data = dataset();
        let root = Subset::make_root(&data);
        let stats = NodeStats::regression(&root);
        let mut state = RegState::new(data.meta(), 1);

        state.numerical_init(&stats);
        state.move_one_sample(1.0, 1);
        let cost = state.move_one_sample(1.0, 1);
        // Both sides constant: residuals vanish.
        assert!(approx_eq!(f64, cost, 0.0, epsilon = 1e-12));
    }

    #[test]
    fn test_bin_walk_matches_direct_cost() {
        let mut data = Dataset::new();
        data.add_feature(FeatureColumn::U8(vec![0, 0, 1, 1]), FeatureKind::ManyVsMany)
            .unwrap();
        data.add_label(LabelColumn::Float(vec![1.0, 1.0, 3.0, 5.0])).unwrap();
        data.add_default_sample_weights().unwrap();
        let root = Subset::make_root(&data);
        let stats = NodeStats::regression(&root);
        let mut state = RegState::new(data.meta(), 1);

        let bins = data.feature(0).gather_bins(root.sample_ids());
        state.discrete_init(&bins, root.labels().as_float(), root.sample_weights(), 2, &stats);
        assert_eq!(state.num_bins(), 2);

        state.reorder_bin_ids();
        // Means: bin 0 -> 1.0, bin 1 -> 4.0, so bin 0 walks first.
        assert_eq!(state.bin_id(0), 0);

        let cost = state.move_one_bin_l2r(0);
        // Right side {1,1} has zero residual; left {3,5} leaves
        // 36 - 32 - 2 = 2.
        assert!(approx_eq!(f64, cost, 2.0, epsilon = 1e-12));
    }
}
