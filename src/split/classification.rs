//! Classification split state.
//!
//! One `ClaState` per worker maintains class histograms for the two sides
//! of a candidate split and a running cost that is updated incrementally
//! as samples or whole bins move between the sides. Gini runs on floating
//! class weights; entropy runs on integral weights so its cost reduces to
//! lookups in the trainer's `n*log2(n)` table.

use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::sync::Arc;

use rand::Rng;

use crate::core::column::LabelColumn;
use crate::core::dataset::MetaData;
use crate::core::stats::NodeStats;
use crate::cost::{round_count, EntropyContext};
use crate::split::splitter::SplitState;
use crate::utils::random::partial_shuffle;

/// The unit class histograms are counted in: `f64` for Gini, `u32` for
/// entropy (class weights scaled integral by the table multiplier).
pub(crate) trait ClassWeight:
    Copy + Default + PartialOrd + std::fmt::Debug + Add<Output = Self> + Sub<Output = Self> + AddAssign + SubAssign
{
    fn from_scaled(weight: f64, multiplier: f64) -> Self;
    fn times(self, sample_weight: u32) -> Self;
    fn as_f64(self) -> f64;
}

impl ClassWeight for f64 {
    fn from_scaled(weight: f64, multiplier: f64) -> f64 {
        weight * multiplier
    }

    fn times(self, sample_weight: u32) -> f64 {
        self * sample_weight as f64
    }

    fn as_f64(self) -> f64 {
        self
    }
}

impl ClassWeight for u32 {
    fn from_scaled(weight: f64, multiplier: f64) -> u32 {
        round_count(weight * multiplier)
    }

    fn times(self, sample_weight: u32) -> u32 {
        self * sample_weight
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

/// The cost-specific part of the classification state: how to seed the
/// histograms from node stats, how to update the running cost when one
/// sample moves left to right, and how to price a whole histogram.
pub(crate) trait ClaCost {
    type Weight: ClassWeight;

    fn multiplier(&self) -> f64;

    /// Seeds `histogram` from the node stats; returns the weighted sample
    /// count and the initial left updater.
    fn init(&self, stats: &NodeStats, histogram: &mut [Self::Weight]) -> (Self::Weight, f64);

    /// Incremental cost after one sample of `weight` moved left to right.
    /// All counts passed in are post-move.
    #[allow(clippy::too_many_arguments)]
    fn update(
        &self,
        updater_left: &mut f64,
        updater_right: &mut f64,
        weight: Self::Weight,
        wnum_left: Self::Weight,
        one_left: Self::Weight,
        wnum_right: Self::Weight,
        one_right: Self::Weight,
    ) -> f64;

    fn compute(&self, histogram: &[Self::Weight], wnum_samples: Self::Weight) -> f64;
}

#[derive(Debug, Default)]
pub(crate) struct GiniCost;

impl ClaCost for GiniCost {
    type Weight = f64;

    fn multiplier(&self) -> f64 {
        1.0
    }

    fn init(&self, stats: &NodeStats, histogram: &mut [f64]) -> (f64, f64) {
        histogram.copy_from_slice(stats.histogram());
        let wnum_samples = stats.split_count();
        (wnum_samples, wnum_samples * stats.cost())
    }

    fn update(
        &self,
        updater_left: &mut f64,
        updater_right: &mut f64,
        weight: f64,
        wnum_left: f64,
        one_left: f64,
        wnum_right: f64,
        one_right: f64,
    ) -> f64 {
        *updater_left -= 2.0 * weight * (wnum_left - one_left);
        *updater_right += 2.0 * weight * (wnum_right - one_right);
        *updater_left / wnum_left + *updater_right / wnum_right
    }

    fn compute(&self, histogram: &[f64], wnum_samples: f64) -> f64 {
        if wnum_samples <= 0.0 {
            return 0.0;
        }
        histogram.iter().map(|&h| h * (wnum_samples - h)).sum::<f64>() / wnum_samples
    }
}

#[derive(Debug)]
pub(crate) struct EntropyCost {
    pub context: Arc<EntropyContext>,
}

impl ClaCost for EntropyCost {
    type Weight = u32;

    fn multiplier(&self) -> f64 {
        self.context.multiplier()
    }

    fn init(&self, stats: &NodeStats, histogram: &mut [u32]) -> (u32, f64) {
        let multiplier = self.context.multiplier();
        for (target, &h) in histogram.iter_mut().zip(stats.histogram().iter()) {
            *target = round_count(h * multiplier);
        }
        let wnum_samples = round_count(stats.split_count() * multiplier);
        (wnum_samples, stats.cost())
    }

    fn update(
        &self,
        updater_left: &mut f64,
        updater_right: &mut f64,
        weight: u32,
        wnum_left: u32,
        one_left: u32,
        wnum_right: u32,
        one_right: u32,
    ) -> f64 {
        *updater_left -= self.context.delta_nlogn(wnum_left + weight, wnum_left)
            - self.context.delta_nlogn(one_left + weight, one_left);
        *updater_right += self.context.delta_nlogn(wnum_right, wnum_right - weight)
            - self.context.delta_nlogn(one_right, one_right - weight);
        *updater_left + *updater_right
    }

    fn compute(&self, histogram: &[u32], wnum_samples: u32) -> f64 {
        histogram
            .iter()
            .fold(self.context.nlogn(wnum_samples), |cost, &h| cost - self.context.nlogn(h))
    }
}

#[derive(Debug)]
pub(crate) struct ClaState<C: ClaCost> {
    cost: C,
    num_classes: usize,
    class_weights: Vec<C::Weight>,
    effective_min_leaf: C::Weight,

    init_left: Vec<C::Weight>,
    init_right: Vec<C::Weight>,
    cur_left: Vec<C::Weight>,
    cur_right: Vec<C::Weight>,
    /// `bin * num_classes + class` weighted counts of the current feature.
    bin_class_matrix: Vec<C::Weight>,
    binwise_wnum: Vec<C::Weight>,
    bin_ids: Vec<u32>,
    fractions: Vec<f64>,

    wnum_left: C::Weight,
    wnum_right: C::Weight,
    wnum_samples: C::Weight,
    num_bins: u32,
    updater_left: f64,
    updater_right: f64,
}

impl<C: ClaCost> ClaState<C> {
    pub fn new(meta: &MetaData, class_weights: &[f64], min_leaf_node: u32, cost: C) -> Self {
        let num_classes = meta.num_classes;
        let max_num_bins = meta.max_num_bins as usize;
        let multiplier = cost.multiplier();
        ClaState {
            num_classes,
            class_weights: class_weights
                .iter()
                .map(|&w| C::Weight::from_scaled(w, multiplier))
                .collect(),
            effective_min_leaf: C::Weight::from_scaled(min_leaf_node as f64, multiplier),
            init_left: vec![C::Weight::default(); num_classes],
            init_right: vec![C::Weight::default(); num_classes],
            cur_left: vec![C::Weight::default(); num_classes],
            cur_right: vec![C::Weight::default(); num_classes],
            bin_class_matrix: vec![C::Weight::default(); max_num_bins * num_classes],
            binwise_wnum: vec![C::Weight::default(); max_num_bins],
            bin_ids: vec![0; max_num_bins],
            fractions: vec![0.0; max_num_bins],
            wnum_left: C::Weight::default(),
            wnum_right: C::Weight::default(),
            wnum_samples: C::Weight::default(),
            num_bins: 0,
            updater_left: 0.0,
            updater_right: 0.0,
            cost,
        }
    }

    fn row(&self, bin: u32) -> std::ops::Range<usize> {
        let offset = bin as usize * self.num_classes;
        offset..offset + self.num_classes
    }

    fn side_costs(&self) -> f64 {
        self.cost.compute(&self.cur_left, self.wnum_left) + self.cost.compute(&self.cur_right, self.wnum_right)
    }
}

impl<C: ClaCost> SplitState for ClaState<C> {
    type Label = u32;

    fn borrow_labels(labels: &LabelColumn) -> &[u32] {
        labels.as_int()
    }

    fn numerical_init(&mut self, stats: &NodeStats) {
        let (wnum_samples, updater_left) = self.cost.init(stats, &mut self.cur_left);
        self.cur_right.fill(C::Weight::default());
        self.wnum_samples = wnum_samples;
        self.wnum_left = wnum_samples;
        self.wnum_right = C::Weight::default();
        self.updater_left = updater_left;
        self.updater_right = 0.0;
    }

    fn move_one_sample(&mut self, label: u32, sample_weight: u32) -> f64 {
        let label = label as usize;
        let weight = self.class_weights[label].times(sample_weight);
        self.cur_left[label] -= weight;
        self.cur_right[label] += weight;
        self.wnum_left -= weight;
        self.wnum_right += weight;
        self.cost.update(
            &mut self.updater_left,
            &mut self.updater_right,
            weight,
            self.wnum_left,
            self.cur_left[label],
            self.wnum_right,
            self.cur_right[label],
        )
    }

    fn discrete_init(
        &mut self,
        bins: &[u32],
        labels: &[u32],
        sample_weights: &[u32],
        feature_num_bins: u32,
        stats: &NodeStats,
    ) {
        for ((&bin, &label), &sample_weight) in bins.iter().zip(labels.iter()).zip(sample_weights.iter()) {
            let weight = self.class_weights[label as usize].times(sample_weight);
            self.bin_class_matrix[bin as usize * self.num_classes + label as usize] += weight;
        }
        for bin in 0..feature_num_bins {
            let row = self.row(bin);
            let mut wnum = C::Weight::default();
            for idx in row {
                wnum += self.bin_class_matrix[idx];
            }
            self.binwise_wnum[bin as usize] = wnum;
            if wnum > C::Weight::default() {
                self.bin_ids[self.num_bins as usize] = bin;
                self.num_bins += 1;
            }
        }

        let (wnum_samples, updater_left) = self.cost.init(stats, &mut self.init_left);
        self.cur_left.copy_from_slice(&self.init_left);
        self.init_right.fill(C::Weight::default());
        self.cur_right.fill(C::Weight::default());
        self.wnum_samples = wnum_samples;
        self.wnum_left = wnum_samples;
        self.wnum_right = C::Weight::default();
        self.updater_left = updater_left;
        self.updater_right = 0.0;
    }

    fn clear(&mut self) {
        for idx in 0..self.num_bins as usize {
            let bin = self.bin_ids[idx];
            self.binwise_wnum[bin as usize] = C::Weight::default();
            let row = self.row(bin);
            self.bin_class_matrix[row].fill(C::Weight::default());
        }
        self.num_bins = 0;
    }

    fn move_one_bin_l2r(&mut self, bin: u32) -> f64 {
        let row = self.row(bin);
        for (class, idx) in row.enumerate() {
            let amount = self.bin_class_matrix[idx];
            self.cur_left[class] -= amount;
            self.cur_right[class] += amount;
        }
        self.wnum_left -= self.binwise_wnum[bin as usize];
        self.wnum_right += self.binwise_wnum[bin as usize];
        self.side_costs()
    }

    fn move_one_bin_r2l(&mut self, bin: u32) -> f64 {
        let row = self.row(bin);
        for (class, idx) in row.enumerate() {
            let amount = self.bin_class_matrix[idx];
            self.cur_left[class] += amount;
            self.cur_right[class] -= amount;
        }
        self.wnum_left += self.binwise_wnum[bin as usize];
        self.wnum_right -= self.binwise_wnum[bin as usize];
        self.side_costs()
    }

    fn set_one_vs_all(&mut self, bin: u32) -> f64 {
        let row = self.row(bin);
        for (class, idx) in row.clone().enumerate() {
            self.cur_left[class] = self.init_left[class] - self.bin_class_matrix[idx];
        }
        self.wnum_left = self.wnum_samples - self.binwise_wnum[bin as usize];
        self.wnum_right = self.binwise_wnum[bin as usize];
        self.cost.compute(&self.cur_left, self.wnum_left)
            + self.cost.compute(&self.bin_class_matrix[row], self.wnum_right)
    }

    fn reorder_bin_ids(&mut self) {
        // Binary classification only: bins walk in ascending class-0
        // fraction, which for two classes is descending class-1
        // fraction; both orderings visit the same bipartitions.
        for idx in 0..self.num_bins as usize {
            let bin = self.bin_ids[idx] as usize;
            self.fractions[bin] = self.bin_class_matrix[bin * self.num_classes].as_f64()
                / self.binwise_wnum[bin].as_f64();
        }
        let fractions = &self.fractions;
        self.bin_ids[..self.num_bins as usize]
            .sort_by(|&x, &y| fractions[x as usize].partial_cmp(&fractions[y as usize]).unwrap());
    }

    fn move_one_bin_out_of_place(&mut self, bin: u32) -> f64 {
        let row = self.row(bin);
        for (class, idx) in row.enumerate() {
            let amount = self.bin_class_matrix[idx];
            self.cur_left[class] = self.init_left[class] - amount;
            self.cur_right[class] = self.init_right[class] + amount;
        }
        let wnum_left = self.wnum_left - self.binwise_wnum[bin as usize];
        let wnum_right = self.wnum_right + self.binwise_wnum[bin as usize];
        self.cost.compute(&self.cur_left, wnum_left) + self.cost.compute(&self.cur_right, wnum_right)
    }

    fn move_one_bin_in_place(&mut self, bin: u32) {
        let row = self.row(bin);
        for (class, idx) in row.enumerate() {
            let amount = self.bin_class_matrix[idx];
            self.init_left[class] -= amount;
            self.init_right[class] += amount;
        }
        self.wnum_left -= self.binwise_wnum[bin as usize];
        self.wnum_right += self.binwise_wnum[bin as usize];
    }

    fn below_min_leaf(&self) -> bool {
        self.wnum_left < self.effective_min_leaf || self.wnum_right < self.effective_min_leaf
    }

    fn num_bins(&self) -> u32 {
        self.num_bins
    }

    fn bin_id(&self, idx: u32) -> u32 {
        self.bin_ids[idx as usize]
    }

    fn shuffle_bin_ids<R: Rng>(&mut self, rng: &mut R, n: u32, k: u32) {
        partial_shuffle(rng, &mut self.bin_ids, n as usize, k as usize);
    }

    fn switch_with_last(&mut self, idx: u32, num_bins: u32) {
        self.bin_ids.swap(idx as usize, num_bins as usize - 1);
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;
    use crate::core::column::{FeatureColumn, FeatureKind, LabelColumn};
    use crate::core::dataset::Dataset;
    use crate::core::subset::Subset;

    fn binary_dataset() -> Dataset {
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
    fn test_gini_incremental_matches_direct() {
        let dataset = binary_dataset();
        let root = Subset::make_root(&dataset);
        let stats = NodeStats::classification(&root, 2, dataset.class_weights(), None);
        let mut state = ClaState::new(dataset.meta(), dataset.class_weights(), 1, GiniCost);

        state.numerical_init(&stats);
        // Samples arrive in sorted order: labels 0, 0, 1, 1.
        let cost_after_one = state.move_one_sample(0, 1);
        // Direct: left [1,2] -> 1*2/3*2 = 4/3; right [1,0] -> 0.
        assert!(approx_eq!(f64, cost_after_one, 4.0 / 3.0, epsilon = 1e-12));

        let cost_after_two = state.move_one_sample(0, 1);
        // Perfect split: both sides pure.
        assert!(approx_eq!(f64, cost_after_two, 0.0, epsilon = 1e-12));
    }

    #[test]
    fn test_entropy_incremental_matches_direct() {
        let dataset = binary_dataset();
        let root = Subset::make_root(&dataset);
        let context = Arc::new(EntropyContext::new(&dataset).unwrap());
        let stats = NodeStats::classification(&root, 2, dataset.class_weights(), Some(&context));
        let mut state = ClaState::new(
            dataset.meta(),
            dataset.class_weights(),
            1,
            EntropyCost {
                context: Arc::clone(&context),
            },
        );

        state.numerical_init(&stats);
        state.move_one_sample(0, 1);
        let cost = state.move_one_sample(0, 1);
        // Pure sides carry zero entropy.
        assert!(approx_eq!(f64, cost, 0.0, epsilon = 1e-9));
    }

    #[test]
    fn test_discrete_init_bins() {
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::U8(vec![0, 0, 2, 2, 2]), FeatureKind::ManyVsMany)
            .unwrap();
        dataset.add_label(LabelColumn::Int(vec![0, 0, 1, 1, 0])).unwrap();
        dataset.add_class_weights(vec![1.0, 1.0]).unwrap();
        dataset.add_default_sample_weights().unwrap();
        let root = Subset::make_root(&dataset);
        let stats = NodeStats::classification(&root, 2, dataset.class_weights(), None);
        let mut state = ClaState::new(dataset.meta(), dataset.class_weights(), 1, GiniCost);

        let bins = dataset.feature(0).gather_bins(root.sample_ids());
        state.discrete_init(
            &bins,
            root.labels().as_int(),
            root.sample_weights(),
            3,
            &stats,
        );
        // Bin 1 is empty, so only two populated bins are recorded.
        assert_eq!(state.num_bins(), 2);
        assert_eq!(state.bin_id(0), 0);
        assert_eq!(state.bin_id(1), 2);

        let cost = state.move_one_bin_l2r(0);
        // Left keeps bin 2 ([1,2], gini 4/3) and right holds bin 0
        // ([2,0], pure).
        assert!(approx_eq!(f64, cost, 4.0 / 3.0, epsilon = 1e-12));

        state.clear();
        assert_eq!(state.num_bins(), 0);
        assert!(state.bin_class_matrix.iter().all(|&w| w == 0.0));
    }
}
