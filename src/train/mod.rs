//! Training drivers: one tree, or a bootstrap-aggregated forest.
//!
//! A `TreeTrainer` grows a single tree over a loaded dataset. A
//! `ForestTrainer` presorts every continuous feature once, then trains
//! its trees over bootstrap sample weights, reusing the presorted orders
//! and accumulating in-bag and out-of-bag outputs as it goes.

pub(crate) mod builder;
pub(crate) mod parallel;

use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::column::FeatureKind;
use crate::core::dataset::Dataset;
use crate::cost::{CostFunction, EntropyContext};
use crate::error::{Result, TrainError};
use crate::predict::{PredictFilter, TreePredictor};
use crate::stored::StoredTree;
use crate::train::builder::TreeBuilder;
use crate::train::parallel::ParallelDriver;
use crate::utils::helpers;
use crate::utils::random;

/// Hyperparameters of one tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    pub cost_function: CostFunction,
    pub num_features_for_split: u32,
    pub min_leaf_node: u32,
    pub min_split_node: u32,
    pub max_depth: u32,
    pub max_num_nodes: u32,
    pub random_state: u64,
}

fn check_params(params: &TreeParams) -> Result<()> {
    if params.num_features_for_split == 0 {
        return Err(TrainError::InvalidInput(
            "at least one feature must be sampled per split".to_string(),
        ));
    }
    if params.min_leaf_node == 0 {
        return Err(TrainError::InvalidInput(
            "min_leaf_node must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Fills in default class weights for classification datasets and checks
/// the dataset against the cost function. Returns the entropy context
/// when one is needed; any failure surfaces before a single job runs.
fn preflight(dataset: &mut Dataset, cost_function: CostFunction) -> Result<Option<Arc<EntropyContext>>> {
    if cost_function.is_classification() && dataset.class_weights().is_empty() && dataset.meta().num_classes > 0 {
        dataset.add_class_weights(vec![1.0; dataset.meta().num_classes])?;
    }
    dataset.validate(cost_function)?;
    match cost_function {
        CostFunction::Entropy => Ok(Some(Arc::new(EntropyContext::new(dataset)?))),
        _ => Ok(None),
    }
}

/// Grows one tree over the loaded dataset. Shared by the two trainers.
fn train_one_tree(
    dataset: &Dataset,
    mut params: TreeParams,
    num_threads: usize,
    presorted: Option<&[Vec<u32>]>,
    entropy: Option<Arc<EntropyContext>>,
) -> StoredTree {
    params.num_features_for_split = params
        .num_features_for_split
        .min(dataset.meta().num_features as u32);
    let builder = TreeBuilder::new(dataset, params, presorted, entropy);
    if num_threads <= 1 {
        let mut ctx = builder.make_worker_ctx(0);
        let root = builder.setup_root();
        let finished = builder.build_subtree(root, &mut ctx);
        debug_assert!(finished, "the serial walk processes the whole tree");
        let mut tree = builder.write_to_tree();
        tree.finalize(vec![ctx.importance], dataset.meta().num_features);
        tree
    } else {
        ParallelDriver::new(&builder).build(num_threads)
    }
}

/// Whole-dataset sorted sample ids per continuous feature; discrete
/// features keep an empty slot. Computed once per forest and shared by
/// every tree.
fn presort_features(dataset: &Dataset) -> Vec<Vec<u32>> {
    (0..dataset.meta().num_features)
        .into_par_iter()
        .map(|feature_idx| {
            if dataset.feature_kind(feature_idx) != FeatureKind::Continuous {
                return Vec::new();
            }
            match dataset.feature(feature_idx) {
                crate::core::column::FeatureColumn::F32(values) => argsort(values),
                crate::core::column::FeatureColumn::F64(values) => argsort(values),
                _ => unreachable!("continuous tag on a discrete column"),
            }
        })
        .collect()
}

fn argsort<T: PartialOrd + Copy + Sync>(values: &[T]) -> Vec<u32> {
    let mut pairs: Vec<(T, u32)> = values.iter().enumerate().map(|(i, &v)| (v, i as u32)).collect();
    pairs.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap());
    pairs.into_iter().map(|(_, i)| i).collect()
}

/// Trains a single decision tree.
#[derive(Debug)]
pub struct TreeTrainer<'a> {
    params: TreeParams,
    num_threads: usize,
    dataset: Option<&'a mut Dataset>,

    init_loss: f64,
    final_loss: f64,
    relative_loss_reduction: f64,
    feature_importance: Vec<f64>,
    feature_rank: Vec<usize>,
    train_accuracy: f64,
    train_loss: f64,
}

impl<'a> TreeTrainer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cost_function: CostFunction,
        num_features_for_split: u32,
        min_leaf_node: u32,
        min_split_node: u32,
        max_depth: u32,
        random_state: u64,
        num_threads: usize,
    ) -> Self {
        TreeTrainer {
            params: TreeParams {
                cost_function,
                num_features_for_split,
                min_leaf_node,
                min_split_node,
                max_depth,
                max_num_nodes: u32::MAX,
                random_state,
            },
            num_threads: num_threads.max(1),
            dataset: None,
            init_loss: 0.0,
            final_loss: 0.0,
            relative_loss_reduction: 0.0,
            feature_importance: Vec::new(),
            feature_rank: Vec::new(),
            train_accuracy: 0.0,
            train_loss: 0.0,
        }
    }

    pub fn load_data(&mut self, dataset: &'a mut Dataset) {
        self.dataset = Some(dataset);
    }

    /// # Panics
    ///
    /// If no dataset was loaded.
    pub fn load_sample_weights(&mut self, sample_weights: Vec<u32>) -> Result<()> {
        self.dataset
            .as_deref_mut()
            .expect("load_data precedes load_sample_weights")
            .add_sample_weights(sample_weights)
    }

    /// # Panics
    ///
    /// If no dataset was loaded.
    pub fn load_default_sample_weights(&mut self) -> Result<()> {
        self.dataset
            .as_deref_mut()
            .expect("load_data precedes load_default_sample_weights")
            .add_default_sample_weights()
    }

    pub fn train(&mut self) -> Result<StoredTree> {
        check_params(&self.params)?;
        // The dataset reference moves out for the duration of training so
        // the trainer's own fields stay free to update; it goes back in
        // whether training succeeds or fails.
        let dataset = self
            .dataset
            .take()
            .ok_or_else(|| TrainError::InvalidInput("no dataset loaded".to_string()))?;
        let result = self.train_tree(dataset);
        self.dataset = Some(dataset);
        result
    }

    fn train_tree(&mut self, dataset: &mut Dataset) -> Result<StoredTree> {
        let entropy = preflight(dataset, self.params.cost_function)?;

        let tree = train_one_tree(dataset, self.params.clone(), self.num_threads, None, entropy);

        self.init_loss = tree.init_loss;
        self.final_loss = tree.final_loss;
        self.relative_loss_reduction = tree.relative_loss_reduction;
        self.feature_importance = tree.feature_importance.clone();
        self.feature_rank = helpers::rank_descending(&self.feature_importance);
        self.evaluate_on_training_set(&tree, dataset);

        info!(
            "tree trained: depth {}, {} cells, {} leaves, loss {:.6} -> {:.6}",
            tree.max_depth, tree.num_cell, tree.num_leaf, tree.init_loss, tree.final_loss
        );
        Ok(tree)
    }

    fn evaluate_on_training_set(&mut self, tree: &StoredTree, dataset: &Dataset) {
        let predictor = TreePredictor::new(tree);
        let weights = dataset.sample_weights();
        if self.params.cost_function.is_classification() {
            let labels = dataset.labels().as_int();
            let mut correct = 0u64;
            let mut total = 0u64;
            for sample_id in 0..dataset.meta().size {
                let weight = weights[sample_id] as u64;
                if weight == 0 {
                    continue;
                }
                total += weight;
                let decision = helpers::arg_max(predictor.probability_one(dataset, sample_id)).0 as u32;
                if decision == labels[sample_id] {
                    correct += weight;
                }
            }
            self.train_accuracy = correct as f64 / total as f64;
        } else {
            let labels = dataset.labels().as_float();
            let mut loss = 0.0;
            for sample_id in 0..dataset.meta().size {
                let weight = weights[sample_id] as f64;
                if weight == 0.0 {
                    continue;
                }
                let diff = predictor.mean_one(dataset, sample_id) - labels[sample_id];
                loss += weight * diff * diff;
            }
            self.train_loss = loss / dataset.meta().num_samples as f64;
        }
    }

    pub fn init_loss(&self) -> f64 {
        self.init_loss
    }

    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }

    pub fn relative_loss_reduction(&self) -> f64 {
        self.relative_loss_reduction
    }

    pub fn feature_importance(&self) -> &[f64] {
        &self.feature_importance
    }

    /// Feature indices by descending importance.
    pub fn feature_rank(&self) -> &[usize] {
        &self.feature_rank
    }

    pub fn train_accuracy(&self) -> f64 {
        self.train_accuracy
    }

    pub fn train_loss(&self) -> f64 {
        self.train_loss
    }
}

/// Trains a bagged forest of trees.
#[derive(Debug)]
pub struct ForestTrainer<'a> {
    params: TreeParams,
    num_trees: u32,
    num_threads: usize,
    dataset: Option<&'a mut Dataset>,

    feature_importance: Vec<f64>,
    feature_rank: Vec<usize>,
    output_probability: Vec<Vec<f64>>,
    output_mean: Vec<f64>,
    oob_output_probability: Vec<Vec<f64>>,
    oob_output_mean: Vec<f64>,

    train_accuracy: f64,
    train_loss: f64,
    oob_accuracy: f64,
    oob_loss: f64,
    init_loss: f64,
    final_loss: f64,
    relative_loss_reduction: f64,
    mean_depth: f64,
    mean_num_cell: f64,
    mean_num_leaf: f64,
}

impl<'a> ForestTrainer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cost_function: CostFunction,
        num_features_for_split: u32,
        min_leaf_node: u32,
        min_split_node: u32,
        max_depth: u32,
        max_num_nodes: u32,
        random_state: u64,
        num_threads: usize,
        num_trees: u32,
    ) -> Self {
        ForestTrainer {
            params: TreeParams {
                cost_function,
                num_features_for_split,
                min_leaf_node,
                min_split_node,
                max_depth,
                max_num_nodes,
                random_state,
            },
            num_trees,
            num_threads: num_threads.max(1),
            dataset: None,
            feature_importance: Vec::new(),
            feature_rank: Vec::new(),
            output_probability: Vec::new(),
            output_mean: Vec::new(),
            oob_output_probability: Vec::new(),
            oob_output_mean: Vec::new(),
            train_accuracy: 0.0,
            train_loss: 0.0,
            oob_accuracy: 0.0,
            oob_loss: 0.0,
            init_loss: 0.0,
            final_loss: 0.0,
            relative_loss_reduction: 0.0,
            mean_depth: 0.0,
            mean_num_cell: 0.0,
            mean_num_leaf: 0.0,
        }
    }

    pub fn load_data(&mut self, dataset: &'a mut Dataset) {
        self.dataset = Some(dataset);
    }

    pub fn train(&mut self) -> Result<Vec<StoredTree>> {
        check_params(&self.params)?;
        if self.num_trees == 0 {
            return Err(TrainError::InvalidInput("a forest needs at least one tree".to_string()));
        }
        // As in `TreeTrainer::train`, the dataset reference moves out and
        // goes back in on success and failure alike.
        let dataset = self
            .dataset
            .take()
            .ok_or_else(|| TrainError::InvalidInput("no dataset loaded".to_string()))?;
        let result = self.train_forest(dataset);
        self.dataset = Some(dataset);
        result
    }

    fn train_forest(&mut self, dataset: &mut Dataset) -> Result<Vec<StoredTree>> {
        // Bootstrapping needs a weight slot per row before the first draw.
        if dataset.sample_weights().is_empty() {
            dataset.add_default_sample_weights()?;
        }
        preflight(dataset, self.params.cost_function)?;

        let size = dataset.meta().size;
        let num_classes = dataset.meta().num_classes;
        let is_classification = self.params.cost_function.is_classification();

        let presorted = presort_features(dataset);
        debug!("presorted {} features once for {} trees", presorted.len(), self.num_trees);

        let mut total_sample_weights = vec![0u64; size];
        let mut oob_count = vec![0u32; size];
        let mut importance_sum = vec![0.0; dataset.meta().num_features];
        if is_classification {
            self.output_probability = vec![vec![0.0; num_classes]; size];
            self.oob_output_probability = vec![vec![0.0; num_classes]; size];
        } else {
            self.output_mean = vec![0.0; size];
            self.oob_output_mean = vec![0.0; size];
        }

        let mut bootstrap_rng = random::seeded(self.params.random_state);
        let mut trees = Vec::with_capacity(self.num_trees as usize);
        for tree_id in 0..self.num_trees {
            let mut sample_weights = vec![0u32; size];
            random::sample_with_replacement(&mut bootstrap_rng, size, size, &mut sample_weights);
            for (sample_id, &weight) in sample_weights.iter().enumerate() {
                if weight == 0 {
                    oob_count[sample_id] += 1;
                } else {
                    total_sample_weights[sample_id] += weight as u64;
                }
            }
            dataset.add_sample_weights(sample_weights)?;

            let mut params = self.params.clone();
            params.random_state = self.params.random_state + tree_id as u64;
            // The bootstrap reweights the classes, so the entropy table is
            // rebuilt against each tree's weighted sample count.
            let entropy = match self.params.cost_function {
                CostFunction::Entropy => Some(Arc::new(EntropyContext::new(dataset)?)),
                _ => None,
            };
            let tree = train_one_tree(dataset, params, self.num_threads, Some(&presorted), entropy);
            debug!(
                "tree {}/{}: depth {}, {} cells, {} leaves",
                tree_id + 1,
                self.num_trees,
                tree.max_depth,
                tree.num_cell,
                tree.num_leaf
            );

            self.accumulate(&tree, dataset, &mut importance_sum);
            trees.push(tree);
        }

        self.reduce(&trees, dataset, &total_sample_weights, &oob_count, importance_sum);
        info!(
            "forest trained: {} trees, mean depth {:.1}, relative loss reduction {:.4}",
            self.num_trees, self.mean_depth, self.relative_loss_reduction
        );
        Ok(trees)
    }

    fn accumulate(&mut self, tree: &StoredTree, dataset: &Dataset, importance_sum: &mut [f64]) {
        let predictor = TreePredictor::new(tree);
        let weights = dataset.sample_weights();
        if self.params.cost_function.is_classification() {
            let in_bag = predictor.probability_batch(dataset, PredictFilter::InBag);
            let out_of_bag = predictor.probability_batch(dataset, PredictFilter::OutOfBag);
            for sample_id in 0..dataset.meta().size {
                let weight = weights[sample_id];
                if weight == 0 {
                    for (total, p) in self.oob_output_probability[sample_id]
                        .iter_mut()
                        .zip(out_of_bag[sample_id].iter())
                    {
                        *total += p;
                    }
                } else {
                    for (total, p) in self.output_probability[sample_id]
                        .iter_mut()
                        .zip(in_bag[sample_id].iter())
                    {
                        *total += weight as f64 * p;
                    }
                }
            }
        } else {
            let in_bag = predictor.mean_batch(dataset, PredictFilter::InBag);
            let out_of_bag = predictor.mean_batch(dataset, PredictFilter::OutOfBag);
            for sample_id in 0..dataset.meta().size {
                let weight = weights[sample_id];
                if weight == 0 {
                    self.oob_output_mean[sample_id] += out_of_bag[sample_id];
                } else {
                    self.output_mean[sample_id] += weight as f64 * in_bag[sample_id];
                }
            }
        }
        for (total, &value) in importance_sum.iter_mut().zip(tree.feature_importance.iter()) {
            *total += value;
        }
    }

    fn reduce(
        &mut self,
        trees: &[StoredTree],
        dataset: &Dataset,
        total_sample_weights: &[u64],
        oob_count: &[u32],
        mut importance_sum: Vec<f64>,
    ) {
        let size = dataset.meta().size;
        if self.params.cost_function.is_classification() {
            for histogram in self.output_probability.iter_mut() {
                helpers::normalize(histogram);
            }
            for histogram in self.oob_output_probability.iter_mut() {
                helpers::normalize(histogram);
            }
        } else {
            for sample_id in 0..size {
                if total_sample_weights[sample_id] > 0 {
                    self.output_mean[sample_id] /= total_sample_weights[sample_id] as f64;
                }
                if oob_count[sample_id] > 0 {
                    self.oob_output_mean[sample_id] /= oob_count[sample_id] as f64;
                }
            }
        }

        helpers::normalize(&mut importance_sum);
        self.feature_rank = helpers::rank_descending(&importance_sum);
        self.feature_importance = importance_sum;

        let num_trees = trees.len() as f64;
        self.init_loss = trees.iter().map(|t| t.init_loss).sum::<f64>() / num_trees;
        self.final_loss = trees.iter().map(|t| t.final_loss).sum::<f64>() / num_trees;
        self.relative_loss_reduction = if self.init_loss > 0.0 {
            1.0 - self.final_loss / self.init_loss
        } else {
            0.0
        };
        self.mean_depth = trees.iter().map(|t| t.max_depth as f64).sum::<f64>() / num_trees;
        self.mean_num_cell = trees.iter().map(|t| t.num_cell as f64).sum::<f64>() / num_trees;
        self.mean_num_leaf = trees.iter().map(|t| t.num_leaf as f64).sum::<f64>() / num_trees;

        if self.params.cost_function.is_classification() {
            self.evaluate_classification(dataset, total_sample_weights, oob_count);
        } else {
            self.evaluate_regression(dataset, total_sample_weights, oob_count);
        }
    }

    fn evaluate_classification(&mut self, dataset: &Dataset, total_sample_weights: &[u64], oob_count: &[u32]) {
        let labels = dataset.labels().as_int();
        let mut correct = 0u64;
        let mut total = 0u64;
        let mut oob_correct = 0u64;
        let mut oob_total = 0u64;
        for sample_id in 0..dataset.meta().size {
            if total_sample_weights[sample_id] > 0 {
                total += total_sample_weights[sample_id];
                let decision = helpers::arg_max(&self.output_probability[sample_id]).0 as u32;
                if decision == labels[sample_id] {
                    correct += total_sample_weights[sample_id];
                }
            }
            if oob_count[sample_id] > 0 {
                oob_total += oob_count[sample_id] as u64;
                let decision = helpers::arg_max(&self.oob_output_probability[sample_id]).0 as u32;
                if decision == labels[sample_id] {
                    oob_correct += oob_count[sample_id] as u64;
                }
            }
        }
        self.train_accuracy = correct as f64 / total as f64;
        self.oob_accuracy = if oob_total > 0 {
            oob_correct as f64 / oob_total as f64
        } else {
            0.0
        };
    }

    fn evaluate_regression(&mut self, dataset: &Dataset, total_sample_weights: &[u64], oob_count: &[u32]) {
        let labels = dataset.labels().as_float();
        let mut loss = 0.0;
        let mut oob_loss = 0.0;
        for sample_id in 0..dataset.meta().size {
            if total_sample_weights[sample_id] > 0 {
                let diff = self.output_mean[sample_id] - labels[sample_id];
                loss += total_sample_weights[sample_id] as f64 * diff * diff;
            }
            if oob_count[sample_id] > 0 {
                let diff = self.oob_output_mean[sample_id] - labels[sample_id];
                oob_loss += oob_count[sample_id] as f64 * diff * diff;
            }
        }
        let total: u64 = total_sample_weights.iter().sum();
        let oob_total: u32 = oob_count.iter().sum();
        self.train_loss = if total > 0 { loss / total as f64 } else { 0.0 };
        self.oob_loss = if oob_total > 0 { oob_loss / oob_total as f64 } else { 0.0 };
    }

    pub fn feature_importance(&self) -> &[f64] {
        &self.feature_importance
    }

    pub fn feature_rank(&self) -> &[usize] {
        &self.feature_rank
    }

    /// Forest probability per training sample, averaged over the trees
    /// that trained on it.
    pub fn output_probability(&self) -> &[Vec<f64>] {
        &self.output_probability
    }

    pub fn output_mean(&self) -> &[f64] {
        &self.output_mean
    }

    /// Out-of-bag probability per sample, averaged over the trees that
    /// never saw it.
    pub fn oob_output_probability(&self) -> &[Vec<f64>] {
        &self.oob_output_probability
    }

    pub fn oob_output_mean(&self) -> &[f64] {
        &self.oob_output_mean
    }

    pub fn train_accuracy(&self) -> f64 {
        self.train_accuracy
    }

    pub fn train_loss(&self) -> f64 {
        self.train_loss
    }

    pub fn oob_accuracy(&self) -> f64 {
        self.oob_accuracy
    }

    pub fn oob_loss(&self) -> f64 {
        self.oob_loss
    }

    pub fn init_loss(&self) -> f64 {
        self.init_loss
    }

    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }

    pub fn relative_loss_reduction(&self) -> f64 {
        self.relative_loss_reduction
    }

    pub fn mean_depth(&self) -> f64 {
        self.mean_depth
    }

    pub fn mean_num_cell(&self) -> f64 {
        self.mean_num_cell
    }

    pub fn mean_num_leaf(&self) -> f64 {
        self.mean_num_leaf
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;
    use crate::core::column::{FeatureColumn, LabelColumn};

    fn blob_dataset(n_per_class: usize) -> Dataset {
        // Two well-separated blobs on one continuous feature plus a
        // noisy ordinal feature.
        let mut x = Vec::new();
        let mut bins = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class {
            x.push(0.1 + (i % 10) as f32 * 0.01);
            bins.push((i % 3) as u8);
            labels.push(0);
        }
        for i in 0..n_per_class {
            x.push(0.8 + (i % 10) as f32 * 0.01);
            bins.push((i % 3) as u8);
            labels.push(1);
        }
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::F32(x), FeatureKind::Continuous)
            .unwrap();
        dataset
            .add_feature(FeatureColumn::U8(bins), FeatureKind::Ordinal)
            .unwrap();
        dataset.add_label(LabelColumn::Int(labels)).unwrap();
        dataset
    }

    #[test]
    fn test_tree_trainer_end_to_end() {
        let mut dataset = blob_dataset(50);
        let mut trainer = TreeTrainer::new(CostFunction::Gini, 2, 1, 2, 16, 2, 1);
        trainer.load_data(&mut dataset);
        trainer.load_default_sample_weights().unwrap();
        let tree = trainer.train().unwrap();

        assert!(tree.num_cell >= 1);
        assert!(approx_eq!(f64, trainer.train_accuracy(), 1.0));
        assert!(approx_eq!(
            f64,
            tree.feature_importance.iter().sum::<f64>(),
            1.0,
            epsilon = 1e-9
        ));
    }

    #[test]
    fn test_training_is_deterministic_under_seed() {
        let mut first = blob_dataset(40);
        let mut second = blob_dataset(40);
        let train = |dataset: &mut Dataset| {
            let mut trainer = TreeTrainer::new(CostFunction::Gini, 1, 1, 2, 16, 7, 1);
            trainer.load_data(dataset);
            trainer.load_default_sample_weights().unwrap();
            trainer.train().unwrap()
        };
        let tree_a = train(&mut first);
        let tree_b = train(&mut second);
        assert_eq!(tree_a.cell_type, tree_b.cell_type);
        assert_eq!(tree_a.left, tree_b.left);
        assert_eq!(tree_a.right, tree_b.right);
        assert_eq!(tree_a.leaf_probability, tree_b.leaf_probability);
    }

    #[test]
    fn test_missing_dataset_is_invalid_input() {
        let mut trainer = TreeTrainer::new(CostFunction::Gini, 1, 1, 2, 16, 2, 1);
        assert!(matches!(trainer.train(), Err(TrainError::InvalidInput(_))));
    }

    #[test]
    fn test_forest_trainer_end_to_end() {
        let mut dataset = blob_dataset(30);
        let mut trainer = ForestTrainer::new(CostFunction::Gini, 2, 1, 2, 16, u32::MAX, 2, 1, 5);
        trainer.load_data(&mut dataset);
        let trees = trainer.train().unwrap();

        assert_eq!(trees.len(), 5);
        assert!(trainer.train_accuracy() > 0.9);
        assert!(trainer.oob_accuracy() > 0.8);
        assert!(approx_eq!(
            f64,
            trainer.feature_importance().iter().sum::<f64>(),
            1.0,
            epsilon = 1e-9
        ));
        assert!(trainer.mean_num_leaf() >= 2.0);
    }
}
