//! Batch prediction over a stored tree.
//!
//! Navigation follows the stored cells from the root to a leaf per the
//! kind rules; the batch entry points filter by sample weight so a forest
//! can collect in-bag and out-of-bag outputs separately. Large batches
//! fan out over rayon; small ones stay serial since a tree walk is cheap.

use rayon::prelude::*;

use crate::core::dataset::Dataset;
use crate::stored::StoredTree;
use crate::utils::helpers;

/// Below this many rows a batch predicts serially.
const MIN_BATCH_FOR_PARALLEL: usize = 10_000;

/// Which samples of the dataset a batch prediction covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictFilter {
    All,
    /// Samples with a non-zero weight (part of the training sample).
    InBag,
    /// Samples with a zero weight (left out by the bootstrap).
    OutOfBag,
}

impl PredictFilter {
    fn admits(&self, sample_weight: u32) -> bool {
        match self {
            PredictFilter::All => true,
            PredictFilter::InBag => sample_weight > 0,
            PredictFilter::OutOfBag => sample_weight == 0,
        }
    }
}

#[derive(Debug)]
pub struct TreePredictor<'a> {
    tree: &'a StoredTree,
}

impl<'a> TreePredictor<'a> {
    pub fn new(tree: &'a StoredTree) -> Self {
        TreePredictor { tree }
    }

    /// Class probability vector of one sample's leaf.
    pub fn probability_one(&self, dataset: &Dataset, sample_id: usize) -> &'a [f64] {
        &self.tree.leaf_probability[self.tree.leaf_for(dataset, sample_id)]
    }

    /// Mean label of one sample's leaf.
    pub fn mean_one(&self, dataset: &Dataset, sample_id: usize) -> f64 {
        self.tree.leaf_mean[self.tree.leaf_for(dataset, sample_id)]
    }

    /// Per-sample probability vectors; rows outside the filter stay
    /// empty.
    pub fn probability_batch(&self, dataset: &Dataset, filter: PredictFilter) -> Vec<Vec<f64>> {
        let weights = dataset.sample_weights();
        let predict = |sample_id: usize| {
            if filter.admits(weights[sample_id]) {
                self.probability_one(dataset, sample_id).to_vec()
            } else {
                Vec::new()
            }
        };
        if dataset.meta().size < MIN_BATCH_FOR_PARALLEL {
            (0..dataset.meta().size).map(predict).collect()
        } else {
            (0..dataset.meta().size).into_par_iter().map(predict).collect()
        }
    }

    /// Per-sample mean labels; rows outside the filter stay zero.
    pub fn mean_batch(&self, dataset: &Dataset, filter: PredictFilter) -> Vec<f64> {
        let weights = dataset.sample_weights();
        let predict = |sample_id: usize| {
            if filter.admits(weights[sample_id]) {
                self.mean_one(dataset, sample_id)
            } else {
                0.0
            }
        };
        if dataset.meta().size < MIN_BATCH_FOR_PARALLEL {
            (0..dataset.meta().size).map(predict).collect()
        } else {
            (0..dataset.meta().size).into_par_iter().map(predict).collect()
        }
    }

    /// Majority-class decisions over all samples.
    pub fn majority_batch(&self, dataset: &Dataset) -> Vec<u32> {
        (0..dataset.meta().size)
            .map(|sample_id| helpers::arg_max(self.probability_one(dataset, sample_id)).0 as u32)
            .collect()
    }
}
