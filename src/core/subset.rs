//! The per-node `Subset`: the restriction of the dataset to one node.
//!
//! A subset keeps the node's sample ids in ascending order with labels
//! and sample weights aligned to them, plus two kinds of cached
//! per-feature data: a sorted order over the node's rows for continuous
//! features, and a "trio" holding either a gathered discrete column or
//! the labels/weights permuted into sorted order for the numerical scan.
//!
//! Sorted orders are expensive; when an ancestor still holds one for the
//! same feature it is usually cheaper to subset it with a linear
//! two-pointer walk than to sort from scratch. The builder makes that
//! choice; this module only provides the mechanics.

use crate::core::column::{FeatureColumn, LabelColumn};
use crate::core::dataset::Dataset;
use crate::split::{SplitInfo, SplitKind, SplitPayload};

/// Per-feature cache bundle.
///
/// For a discrete feature the gathered bins are used by the categorical
/// split search; for a continuous feature the labels and weights permuted
/// into the feature's sorted order feed the linear numerical scan.
#[derive(Debug)]
pub(crate) enum Trio {
    Gathered(Vec<u32>),
    Sorted { labels: LabelColumn, weights: Vec<u32> },
}

impl Trio {
    pub fn bins(&self) -> &[u32] {
        match self {
            Trio::Gathered(bins) => bins,
            Trio::Sorted { .. } => unreachable!("gathered bins expected"),
        }
    }

    pub fn sorted(&self) -> (&LabelColumn, &[u32]) {
        match self {
            Trio::Sorted { labels, weights } => (labels, weights),
            Trio::Gathered(_) => unreachable!("sorted labels expected"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Subset {
    size: usize,
    /// Strictly ascending ids of the samples surviving into this node.
    sample_ids: Vec<u32>,
    /// Labels aligned to `sample_ids`.
    labels: LabelColumn,
    /// Sample weights aligned to `sample_ids`.
    sample_weights: Vec<u32>,
    /// Sorted order per feature; only continuous features ever populate
    /// theirs. `sorted_indices[f][k]` is a position into `sample_ids`.
    sorted_indices: Vec<Option<Vec<u32>>>,
    trios: Vec<Option<Trio>>,
}

impl Subset {
    /// Collects every sample with a non-zero weight, in original order,
    /// so `sample_ids` comes out strictly ascending.
    pub fn make_root(dataset: &Dataset) -> Subset {
        let num_features = dataset.meta().num_features;
        let source_weights = dataset.sample_weights();
        let mut sample_ids = Vec::with_capacity(dataset.meta().size);
        let mut sample_weights = Vec::with_capacity(dataset.meta().size);
        for (sample_id, &weight) in source_weights.iter().enumerate() {
            if weight > 0 {
                sample_ids.push(sample_id as u32);
                sample_weights.push(weight);
            }
        }
        sample_ids.shrink_to_fit();
        sample_weights.shrink_to_fit();
        let labels = dataset.labels().gather(&sample_ids);
        Subset {
            size: sample_ids.len(),
            sample_ids,
            labels,
            sample_weights,
            sorted_indices: (0..num_features).map(|_| None).collect(),
            trios: (0..num_features).map(|_| None).collect(),
        }
    }

    fn from_parts(
        num_features: usize,
        sample_ids: Vec<u32>,
        labels: LabelColumn,
        sample_weights: Vec<u32>,
    ) -> Subset {
        Subset {
            size: sample_ids.len(),
            sample_ids,
            labels,
            sample_weights,
            sorted_indices: (0..num_features).map(|_| None).collect(),
            trios: (0..num_features).map(|_| None).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sample_ids(&self) -> &[u32] {
        &self.sample_ids
    }

    pub fn labels(&self) -> &LabelColumn {
        &self.labels
    }

    pub fn sample_weights(&self) -> &[u32] {
        &self.sample_weights
    }

    pub fn sorted_idx(&self, feature_idx: usize) -> Option<&[u32]> {
        self.sorted_indices[feature_idx].as_deref()
    }

    pub fn trio(&self, feature_idx: usize) -> Option<&Trio> {
        self.trios[feature_idx].as_ref()
    }

    /// Builds this node's sorted order for a continuous feature by
    /// sorting `(value, position)` pairs. Sorting pairs keeps the hot
    /// comparisons on contiguous memory; the sort is stable so ties keep
    /// ascending sample-id order.
    pub fn build_sorted_idx(&self, column: &FeatureColumn) -> Vec<u32> {
        match column {
            FeatureColumn::F32(values) => self.sort_pairs(values),
            FeatureColumn::F64(values) => self.sort_pairs(values),
            _ => unreachable!("sorted order on a discrete column"),
        }
    }

    fn sort_pairs<T: PartialOrd + Copy>(&self, values: &[T]) -> Vec<u32> {
        let mut pairs: Vec<(T, u32)> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(position, &sample_id)| (values[sample_id as usize], position as u32))
            .collect();
        pairs.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap());
        pairs.into_iter().map(|(_, position)| position).collect()
    }

    /// Derives this node's sorted order from an ancestor's by a linear
    /// two-pointer walk over the two ascending `sample_ids` lists.
    ///
    /// Every id in `self` must also appear in `ancestor`.
    pub fn subset_sorted_idx(&self, ancestor: &Subset, feature_idx: usize) -> Vec<u32> {
        let ancestor_order = ancestor
            .sorted_idx(feature_idx)
            .expect("ancestor sorted order was discarded");
        let mut super_to_sub = vec![u32::MAX; ancestor.size];
        let mut super_idx = 0;
        for (sub_idx, &sample_id) in self.sample_ids.iter().enumerate() {
            while ancestor.sample_ids[super_idx] != sample_id {
                super_idx += 1;
            }
            super_to_sub[super_idx] = sub_idx as u32;
            super_idx += 1;
        }
        let mut target = Vec::with_capacity(self.size);
        for &source in ancestor_order {
            let sub_idx = super_to_sub[source as usize];
            if sub_idx != u32::MAX {
                target.push(sub_idx);
            }
        }
        target
    }

    /// Same as `subset_sorted_idx` but the "ancestor" is the whole
    /// dataset and `presorted_idx` holds dataset sample ids in feature
    /// order.
    pub fn presorted_sorted_idx(&self, dataset_size: usize, presorted_idx: &[u32]) -> Vec<u32> {
        let mut super_to_sub = vec![u32::MAX; dataset_size];
        for (sub_idx, &sample_id) in self.sample_ids.iter().enumerate() {
            super_to_sub[sample_id as usize] = sub_idx as u32;
        }
        let mut target = Vec::with_capacity(self.size);
        for &sample_id in presorted_idx {
            let sub_idx = super_to_sub[sample_id as usize];
            if sub_idx != u32::MAX {
                target.push(sub_idx);
            }
        }
        target
    }

    /// Permutes labels and weights into a sorted order for the numerical
    /// scan.
    pub fn gather_sorted_trio(&self, order: &[u32]) -> Trio {
        Trio::Sorted {
            labels: self.labels.gather(order),
            weights: order.iter().map(|&k| self.sample_weights[k as usize]).collect(),
        }
    }

    /// Copies a discrete column at this node's sample ids.
    pub fn gather_bins_trio(&self, dataset: &Dataset, feature_idx: usize) -> Trio {
        Trio::Gathered(dataset.feature(feature_idx).gather_bins(&self.sample_ids))
    }

    pub fn store_sorted_idx(&mut self, feature_idx: usize, order: Vec<u32>) {
        self.sorted_indices[feature_idx] = Some(order);
    }

    pub fn store_trio(&mut self, feature_idx: usize, trio: Trio) {
        self.trios[feature_idx] = Some(trio);
    }

    pub fn discard_sorted_idx(&mut self, feature_idx: usize) {
        self.sorted_indices[feature_idx] = None;
    }

    /// Drops labels, weights and trios once the node has been
    /// partitioned. Sample ids and any retained sorted orders stay for
    /// the descendants' two-pointer walks.
    pub fn discard_temporaries(&mut self) {
        self.labels = match self.labels {
            LabelColumn::Int(_) => LabelColumn::Int(Vec::new()),
            LabelColumn::Float(_) => LabelColumn::Float(Vec::new()),
        };
        self.sample_weights = Vec::new();
        for trio in self.trios.iter_mut() {
            *trio = None;
        }
    }

    /// Splits the node's rows by the decided split's discriminator,
    /// preserving original order so both children keep strictly ascending
    /// sample ids.
    pub fn partition(&self, dataset: &Dataset, split: &SplitInfo) -> (Subset, Subset) {
        let column = dataset.feature(split.feature_idx as usize);
        match (split.kind, &split.payload) {
            (SplitKind::Continuous, SplitPayload::Threshold(threshold)) => match column {
                FeatureColumn::F32(values) => {
                    let threshold = *threshold;
                    self.partition_by(dataset, |sid| values[sid as usize] < threshold)
                }
                FeatureColumn::F64(values) => {
                    let threshold = *threshold as f64;
                    self.partition_by(dataset, |sid| values[sid as usize] < threshold)
                }
                _ => unreachable!("continuous split on a discrete column"),
            },
            (SplitKind::Ordinal, SplitPayload::Bin(ceiling)) => {
                let ceiling = *ceiling;
                self.partition_discrete(dataset, column, |bin| bin <= ceiling)
            }
            (SplitKind::OneVsAll, SplitPayload::Bin(chosen)) => {
                let chosen = *chosen;
                self.partition_discrete(dataset, column, |bin| bin == chosen)
            }
            (SplitKind::LowCardinality, SplitPayload::Mask(mask)) => {
                let mask = *mask;
                self.partition_discrete(dataset, column, |bin| (1u32 << bin) & mask != 0)
            }
            (SplitKind::HighCardinality, SplitPayload::WideMask(words)) => {
                self.partition_discrete(dataset, column, |bin| {
                    words[(bin >> crate::constants::MASK_WORD_SHIFT) as usize]
                        & (1u32 << (bin & crate::constants::MASK_BIT_MASK))
                        != 0
                })
            }
            _ => unreachable!("partition on an undecided split"),
        }
    }

    fn partition_discrete<F: Fn(u32) -> bool>(
        &self,
        dataset: &Dataset,
        column: &FeatureColumn,
        goes_left: F,
    ) -> (Subset, Subset) {
        match column {
            FeatureColumn::U8(values) => self.partition_by(dataset, |sid| goes_left(values[sid as usize] as u32)),
            FeatureColumn::U16(values) => self.partition_by(dataset, |sid| goes_left(values[sid as usize] as u32)),
            FeatureColumn::U32(values) => self.partition_by(dataset, |sid| goes_left(values[sid as usize])),
            _ => unreachable!("discrete split on a continuous column"),
        }
    }

    fn partition_by<F: Fn(u32) -> bool>(&self, dataset: &Dataset, goes_left: F) -> (Subset, Subset) {
        let num_features = dataset.meta().num_features;
        let mut left_positions = Vec::with_capacity(self.size);
        let mut right_positions = Vec::with_capacity(self.size);
        for (position, &sample_id) in self.sample_ids.iter().enumerate() {
            if goes_left(sample_id) {
                left_positions.push(position as u32);
            } else {
                right_positions.push(position as u32);
            }
        }
        let left = self.child_from_positions(num_features, &left_positions);
        let right = self.child_from_positions(num_features, &right_positions);
        (left, right)
    }

    fn child_from_positions(&self, num_features: usize, positions: &[u32]) -> Subset {
        let sample_ids = positions.iter().map(|&p| self.sample_ids[p as usize]).collect();
        let labels = self.labels.gather(positions);
        let sample_weights = positions.iter().map(|&p| self.sample_weights[p as usize]).collect();
        Subset::from_parts(num_features, sample_ids, labels, sample_weights)
    }
}
