//! The compact, read-optimized form a trained tree is emitted into.
//!
//! Internal nodes become cells in flat arrays: `cell_type` packs the
//! split kind into the upper byte and the feature index into the lower 24
//! bits, `cell_info` holds the discriminator payload, and `left`/`right`
//! hold child references where a positive value is a cell id and anything
//! else is a leaf id negated. Wide categorical bitmasks live in a side
//! table indexed through `cell_info`.

use serde::{Deserialize, Serialize};

use crate::constants::{CELL_KIND_SHIFT, GET_FEATURE_IDX, MASK_BIT_MASK, MASK_WORD_SHIFT};
use crate::core::column::FeatureColumn;
use crate::core::dataset::Dataset;
use crate::split::SplitKind;
use crate::utils::helpers;

/// A cell's discriminator payload: a float threshold for continuous
/// splits, otherwise an unsigned value (ceiling bin, chosen bin, one-word
/// mask, or an index into the wide bitmask table).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CellInfo {
    Float(f32),
    Int(u32),
}

impl CellInfo {
    pub fn float(&self) -> f32 {
        match self {
            CellInfo::Float(value) => *value,
            CellInfo::Int(_) => unreachable!("float payload expected"),
        }
    }

    pub fn int(&self) -> u32 {
        match self {
            CellInfo::Int(value) => *value,
            CellInfo::Float(_) => unreachable!("integer payload expected"),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoredTree {
    pub num_cell: usize,
    pub num_leaf: usize,
    pub max_depth: u32,

    pub cell_type: Vec<u32>,
    pub cell_info: Vec<CellInfo>,
    /// Positive: child cell id. Zero or negative: leaf id, negated.
    pub left: Vec<i32>,
    pub right: Vec<i32>,

    /// Word-array bitmasks of high-cardinality splits.
    pub bitmasks: Vec<Vec<u32>>,

    /// Classification leaves: normalized class probability vectors.
    pub leaf_probability: Vec<Vec<f64>>,
    /// Regression leaves: weighted mean labels.
    pub leaf_mean: Vec<f64>,

    /// Per-feature share of the total gain; sums to one when any split
    /// was emitted.
    pub feature_importance: Vec<f64>,
    pub total_gain: f64,
    pub init_loss: f64,
    pub final_loss: f64,
    pub relative_loss_reduction: f64,
}

impl StoredTree {
    pub(crate) fn with_capacity(num_cells: usize, num_leaves: usize) -> StoredTree {
        StoredTree {
            cell_type: Vec::with_capacity(num_cells),
            cell_info: Vec::with_capacity(num_cells),
            left: Vec::with_capacity(num_cells),
            right: Vec::with_capacity(num_cells),
            leaf_probability: Vec::with_capacity(num_leaves),
            leaf_mean: Vec::with_capacity(num_leaves),
            ..StoredTree::default()
        }
    }

    pub(crate) fn pack_cell_type(kind: SplitKind, feature_idx: u32) -> u32 {
        (kind.code() << CELL_KIND_SHIFT) | (feature_idx & GET_FEATURE_IDX)
    }

    pub fn cell_kind(&self, cell_id: usize) -> SplitKind {
        SplitKind::from_code(self.cell_type[cell_id] >> CELL_KIND_SHIFT)
    }

    pub fn cell_feature(&self, cell_id: usize) -> usize {
        (self.cell_type[cell_id] & GET_FEATURE_IDX) as usize
    }

    /// One navigation step: applies the cell's kind rule to the sample
    /// and returns the next reference (positive cell, else negated leaf).
    pub fn next_cell(&self, dataset: &Dataset, cell_id: usize, sample_id: usize) -> i32 {
        let feature_idx = self.cell_feature(cell_id);
        let info = self.cell_info[cell_id];
        let column = dataset.feature(feature_idx);
        let go_left = match self.cell_kind(cell_id) {
            SplitKind::Continuous => match column {
                FeatureColumn::F32(values) => values[sample_id] < info.float(),
                FeatureColumn::F64(values) => values[sample_id] < info.float() as f64,
                _ => unreachable!("continuous cell on a discrete column"),
            },
            SplitKind::Ordinal => column.bin_at(sample_id) <= info.int(),
            SplitKind::OneVsAll => column.bin_at(sample_id) == info.int(),
            SplitKind::LowCardinality => (1u32 << column.bin_at(sample_id)) & info.int() != 0,
            SplitKind::HighCardinality => {
                let bin = column.bin_at(sample_id);
                let words = &self.bitmasks[info.int() as usize];
                words[(bin >> MASK_WORD_SHIFT) as usize] & (1u32 << (bin & MASK_BIT_MASK)) != 0
            }
            SplitKind::Unset | SplitKind::Leaf => unreachable!("undecided cell in a stored tree"),
        };
        if go_left {
            self.left[cell_id]
        } else {
            self.right[cell_id]
        }
    }

    /// Walks a sample from the root to its leaf id.
    pub fn leaf_for(&self, dataset: &Dataset, sample_id: usize) -> usize {
        if self.num_cell == 0 {
            return 0;
        }
        let mut reference = 0i32;
        loop {
            reference = self.next_cell(dataset, reference as usize, sample_id);
            if reference <= 0 {
                return (-reference) as usize;
            }
        }
    }

    /// Reduces the per-worker importance accumulators, normalizes them,
    /// and fills in the loss summary. `final_loss` must already hold the
    /// sum of leaf costs.
    pub(crate) fn finalize(&mut self, importance_by_worker: Vec<Vec<f64>>, num_features: usize) {
        let mut importance = vec![0.0; num_features];
        for worker_importance in &importance_by_worker {
            for (total, value) in importance.iter_mut().zip(worker_importance.iter()) {
                *total += value;
            }
        }
        self.total_gain = importance.iter().sum();
        helpers::normalize(&mut importance);
        self.feature_importance = importance;

        self.init_loss = self.final_loss + self.total_gain;
        self.relative_loss_reduction = if self.init_loss > 0.0 {
            1.0 - self.final_loss / self.init_loss
        } else {
            0.0
        };

        self.num_cell = self.cell_type.len();
        self.cell_type.shrink_to_fit();
        self.cell_info.shrink_to_fit();
        self.left.shrink_to_fit();
        self.right.shrink_to_fit();
        self.bitmasks.shrink_to_fit();
        self.leaf_probability.shrink_to_fit();
        self.leaf_mean.shrink_to_fit();
    }
}
