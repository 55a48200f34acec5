//! Node expansion: stats, split search orchestration, partitioning and
//! the final emission into a `StoredTree`.
//!
//! The builder owns the node arena and the tree-wide counters but no
//! thread of control; the serial trainer and the parallel worker pool
//! both drive it through the same operations. Memory is released in
//! defined steps: a node's trios, labels and weights go right after it is
//! partitioned, its sorted orders go by the memory-saving rule, and the
//! whole subset goes when the node and all its descendants are processed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use rand_chacha::ChaCha8Rng;

use crate::constants::{
    FLOAT_ERROR, MAX_NUM_SAMPLE_FOR_SERIAL_SPLIT, MEMORY_SAVING_FACTOR, SUBSET_TO_SORT_RATIO,
};
use crate::core::dataset::Dataset;
use crate::core::node::{NodeArena, NodeKind, TreeNode};
use crate::core::stats::NodeStats;
use crate::core::subset::Subset;
use crate::cost::{CostFunction, EntropyContext};
use crate::split::splitter::{split_on_feature, AnySplitState};
use crate::split::{SplitKind, SplitPayload};
use crate::stored::{CellInfo, StoredTree};
use crate::train::TreeParams;
use crate::utils::random;

/// What to do with a node after its stats are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SplitDecision {
    /// Not splittable: zero cost, depth or budget exhausted, or too few
    /// samples.
    Leaf,
    /// Search all sampled features on the calling worker.
    Serial,
    /// Large node: fan the per-feature searches out across workers.
    FanOut,
}

/// Everything a worker thread owns while building: its split state, its
/// generator, its feature sampling buffer and its share of the feature
/// importance.
pub(crate) struct WorkerCtx {
    pub state: AnySplitState,
    pub rng: ChaCha8Rng,
    pub importance: Vec<f64>,
    feature_set: Vec<u32>,
}

pub(crate) struct TreeBuilder<'a> {
    pub params: TreeParams,
    pub dataset: &'a Dataset,
    presorted: Option<&'a [Vec<u32>]>,
    entropy: Option<Arc<EntropyContext>>,
    pub arena: NodeArena,
    cell_count: AtomicU32,
    leaf_count: AtomicU32,
    max_depth_seen: AtomicU32,
    /// Serializes the processed-flag propagation walk; the only writer to
    /// parent flags during leaf emission.
    update_mutex: Mutex<()>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        dataset: &'a Dataset,
        params: TreeParams,
        presorted: Option<&'a [Vec<u32>]>,
        entropy: Option<Arc<EntropyContext>>,
    ) -> Self {
        TreeBuilder {
            params,
            dataset,
            presorted,
            entropy,
            arena: NodeArena::new(),
            cell_count: AtomicU32::new(0),
            leaf_count: AtomicU32::new(0),
            max_depth_seen: AtomicU32::new(0),
            update_mutex: Mutex::new(()),
        }
    }

    pub fn make_worker_ctx(&self, worker_id: usize) -> WorkerCtx {
        WorkerCtx {
            state: AnySplitState::new(
                self.params.cost_function,
                self.dataset,
                self.params.min_leaf_node,
                self.entropy.clone(),
            ),
            rng: random::seeded_for_worker(self.params.random_state, worker_id),
            importance: vec![0.0; self.dataset.meta().num_features],
            feature_set: (0..self.dataset.meta().num_features as u32).collect(),
        }
    }

    /// Creates the root node from every sample with non-zero weight.
    pub fn setup_root(&self) -> Arc<TreeNode> {
        self.arena.push_root(Subset::make_root(self.dataset))
    }

    /// Computes the node's stats on first visit and decides how to
    /// proceed.
    pub fn init_split(&self, node: &TreeNode) -> SplitDecision {
        self.max_depth_seen.fetch_max(node.depth, Ordering::SeqCst);
        let mut body = node.body.write().unwrap();
        let subset = body.subset.as_ref().expect("raw node has a subset");
        let stats = match self.params.cost_function {
            CostFunction::Gini => NodeStats::classification(
                subset,
                self.dataset.meta().num_classes,
                self.dataset.class_weights(),
                None,
            ),
            CostFunction::Entropy => NodeStats::classification(
                subset,
                self.dataset.meta().num_classes,
                self.dataset.class_weights(),
                self.entropy.as_deref(),
            ),
            CostFunction::Variance => NodeStats::regression(subset),
        };

        let leaf = stats.cost() <= FLOAT_ERROR
            || self.cell_count.load(Ordering::SeqCst) >= self.params.max_num_nodes
            || node.depth >= self.params.max_depth
            || stats.split_count() < self.params.min_split_node as f64;
        body.stats = Some(stats);
        if leaf {
            SplitDecision::Leaf
        } else if node.size <= MAX_NUM_SAMPLE_FOR_SERIAL_SPLIT {
            SplitDecision::Serial
        } else {
            SplitDecision::FanOut
        }
    }

    /// Samples this node's candidate features: a partial Fisher-Yates
    /// over the worker's feature list, returning the shuffled prefix.
    pub fn sample_features(&self, ctx: &mut WorkerCtx) -> Vec<u32> {
        let num_features = self.dataset.meta().num_features;
        let k = self.params.num_features_for_split as usize;
        random::partial_shuffle(&mut ctx.rng, &mut ctx.feature_set, num_features, k);
        ctx.feature_set[..k].to_vec()
    }

    /// Runs the whole split search of one node on the calling worker.
    pub fn find_split_all(&self, node: &TreeNode, ctx: &mut WorkerCtx) {
        for feature_idx in self.sample_features(ctx) {
            self.find_split_one(node, feature_idx as usize, ctx);
        }
        let mut split = node.split.lock().unwrap();
        split.num_updates = 0;
        split.finish_update();
    }

    /// Prepares the node-local data for one feature and searches it.
    pub fn find_split_one(&self, node: &TreeNode, feature_idx: usize, ctx: &mut WorkerCtx) {
        let kind = self.dataset.feature_kind(feature_idx);
        let discard_after = if kind.is_discrete() {
            let mut body = node.body.write().unwrap();
            let subset = body.subset.as_mut().expect("raw node has a subset");
            let trio = subset.gather_bins_trio(self.dataset, feature_idx);
            subset.store_trio(feature_idx, trio);
            false
        } else {
            let (order, discard_after) = self.prepare_sorted(node, feature_idx);
            let mut body = node.body.write().unwrap();
            let subset = body.subset.as_mut().expect("raw node has a subset");
            let trio = subset.gather_sorted_trio(&order);
            subset.store_sorted_idx(feature_idx, order);
            subset.store_trio(feature_idx, trio);
            discard_after
        };

        {
            let body = node.body.read().unwrap();
            let subset = body.subset.as_ref().expect("raw node has a subset");
            let stats = body.stats.as_ref().expect("stats precede the split search");
            split_on_feature(
                &mut ctx.state,
                &mut ctx.rng,
                self.dataset,
                feature_idx,
                subset,
                stats,
                &node.split,
            );
        }

        if discard_after {
            let mut body = node.body.write().unwrap();
            body.subset
                .as_mut()
                .expect("raw node has a subset")
                .discard_sorted_idx(feature_idx);
        }
    }

    /// Chooses between sorting from scratch and subsetting the nearest
    /// retained ancestor order (or the forest's presorted indices), and
    /// reports whether the fresh order should be discarded after the
    /// search by the memory-saving rule.
    fn prepare_sorted(&self, node: &TreeNode, feature_idx: usize) -> (Vec<u32>, bool) {
        let ancestor = self.find_ancestor(node, feature_idx);
        let ancestor_size = match &ancestor {
            Some(ancestor) => ancestor.size as f64,
            None if self.presorted.is_some() => self.dataset.meta().size as f64,
            None => f64::INFINITY,
        };
        let node_size = node.size as f64;
        let sort_cost = node_size * node_size.log2() * SUBSET_TO_SORT_RATIO;

        let body = node.body.read().unwrap();
        let subset = body.subset.as_ref().expect("raw node has a subset");
        let order = if ancestor_size > sort_cost {
            subset.build_sorted_idx(self.dataset.feature(feature_idx))
        } else if let Some(ancestor) = &ancestor {
            let ancestor_body = ancestor.body.read().unwrap();
            let ancestor_subset = ancestor_body
                .subset
                .as_ref()
                .expect("retained ancestor keeps its subset");
            subset.subset_sorted_idx(ancestor_subset, feature_idx)
        } else {
            let presorted = self.presorted.expect("presorted indices were checked");
            subset.presorted_sorted_idx(self.dataset.meta().size, &presorted[feature_idx])
        };
        (order, node_size * MEMORY_SAVING_FACTOR >= ancestor_size)
    }

    /// Nearest ancestor whose sorted order for this feature has not been
    /// discarded.
    fn find_ancestor(&self, node: &TreeNode, feature_idx: usize) -> Option<Arc<TreeNode>> {
        let mut parent_id = node.parent;
        while let Some(id) = parent_id {
            let ancestor = self.arena.get(id);
            let retained = {
                let body = ancestor.body.read().unwrap();
                body.subset
                    .as_ref()
                    .map_or(false, |subset| subset.sorted_idx(feature_idx).is_some())
            };
            if retained {
                return Some(ancestor);
            }
            parent_id = ancestor.parent;
        }
        None
    }

    /// Partitions the node by its decided split and links the children.
    /// Returns `None` when the node budget is exhausted, in which case
    /// the split is demoted to a leaf and the caller emits it as one.
    pub fn do_split(&self, node: &TreeNode, ctx: &mut WorkerCtx) -> Option<(Arc<TreeNode>, Arc<TreeNode>)> {
        let claimed = self
            .cell_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                if count >= self.params.max_num_nodes {
                    None
                } else {
                    Some(count + 1)
                }
            })
            .is_ok();
        if !claimed {
            node.split.lock().unwrap().kind = SplitKind::Leaf;
            return None;
        }

        let (left_subset, right_subset) = {
            let body = node.body.read().unwrap();
            let subset = body.subset.as_ref().expect("split node has a subset");
            let split = node.split.lock().unwrap();
            ctx.importance[split.feature_idx as usize] += split.gain;
            subset.partition(self.dataset, &split)
        };
        let left = self
            .arena
            .push(NodeKind::LeftChild, node.depth + 1, Some(node.node_id), left_subset);
        let right = self
            .arena
            .push(NodeKind::RightChild, node.depth + 1, Some(node.node_id), right_subset);
        node.set_children(left.node_id, right.node_id);
        node.body
            .write()
            .unwrap()
            .subset
            .as_mut()
            .expect("split node has a subset")
            .discard_temporaries();
        Some((left, right))
    }

    /// Emits the node as a leaf and propagates completion up the tree.
    /// Returns true when the root's last descendant was processed.
    pub fn make_leaf(&self, node: &Arc<TreeNode>) -> bool {
        self.leaf_count.fetch_add(1, Ordering::SeqCst);
        if let Some(subset) = node.body.write().unwrap().subset.as_mut() {
            subset.discard_temporaries();
        }
        self.update_status(node)
    }

    /// Walks up from a processed node, discarding subsets of finished
    /// subtrees. Stops at the first ancestor still waiting on its other
    /// child; reaching past the root means the tree is done.
    fn update_status(&self, node: &Arc<TreeNode>) -> bool {
        let _guard = self.update_mutex.lock().unwrap();
        let mut current = Arc::clone(node);
        loop {
            current.body.write().unwrap().subset = None;
            match current.kind {
                NodeKind::Root => return true,
                kind => {
                    let parent = self.arena.get(current.parent.expect("child nodes have parents"));
                    parent.mark_child_processed(kind);
                    if !parent.both_children_processed() {
                        return false;
                    }
                    current = parent;
                }
            }
        }
    }

    /// Serial post-order expansion of a subtree rooted at `node`; the
    /// one-thread trainer runs this from the root and parallel workers
    /// run it inline for small subtrees. Returns true when the whole tree
    /// finished inside this walk.
    pub fn build_subtree(&self, node: Arc<TreeNode>, ctx: &mut WorkerCtx) -> bool {
        let mut finished = false;
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            match self.init_split(&node) {
                SplitDecision::Leaf => finished |= self.make_leaf(&node),
                SplitDecision::Serial | SplitDecision::FanOut => {
                    self.find_split_all(&node, ctx);
                    let is_leaf = node.split.lock().unwrap().is_leaf();
                    if is_leaf {
                        finished |= self.make_leaf(&node);
                    } else {
                        match self.do_split(&node, ctx) {
                            Some((left, right)) => {
                                stack.push(right);
                                stack.push(left);
                            }
                            None => finished |= self.make_leaf(&node),
                        }
                    }
                }
            }
        }
        finished
    }

    pub fn num_cells(&self) -> usize {
        self.cell_count.load(Ordering::SeqCst) as usize
    }

    pub fn num_leaves(&self) -> usize {
        self.leaf_count.load(Ordering::SeqCst) as usize
    }

    /// Writes the finished node graph into the flat stored form. Cells
    /// are numbered in preorder with the left subtree first, leaves in
    /// the same traversal order. Runs on a single worker after the last
    /// leaf; importance reduction happens later, once every worker has
    /// handed its accumulator back.
    pub fn write_to_tree(&self) -> StoredTree {
        let is_classification = self.params.cost_function.is_classification();
        let mut tree = StoredTree::with_capacity(self.num_cells(), self.num_leaves());
        tree.max_depth = self.max_depth_seen.load(Ordering::SeqCst);

        let mut leaf_top = 0i32;
        // (node, parent cell, is left child); parent -1 marks the root.
        let mut stack: Vec<(u32, i32, bool)> = vec![(0, -1, true)];
        while let Some((node_id, parent_cell, is_left)) = stack.pop() {
            let node = self.arena.get(node_id);
            let split = node.split.lock().unwrap();
            if split.is_leaf() {
                let leaf_id = leaf_top;
                leaf_top += 1;
                let body = node.body.read().unwrap();
                let stats = body.stats.as_ref().expect("leaves keep their stats");
                if is_classification {
                    tree.leaf_probability.push(stats.probability());
                } else {
                    tree.leaf_mean.push(stats.mean());
                }
                tree.final_loss += stats.cost();
                Self::link(&mut tree, parent_cell, is_left, -leaf_id);
            } else {
                let cell_id = tree.cell_type.len() as i32;
                tree.cell_type
                    .push(StoredTree::pack_cell_type(split.kind, split.feature_idx));
                let info = match &split.payload {
                    SplitPayload::Threshold(threshold) => CellInfo::Float(*threshold),
                    SplitPayload::Bin(bin) => CellInfo::Int(*bin),
                    SplitPayload::Mask(mask) => CellInfo::Int(*mask),
                    SplitPayload::WideMask(words) => {
                        tree.bitmasks.push(words.clone());
                        CellInfo::Int(tree.bitmasks.len() as u32 - 1)
                    }
                    SplitPayload::None => unreachable!("decided split has a payload"),
                };
                tree.cell_info.push(info);
                tree.left.push(0);
                tree.right.push(0);
                Self::link(&mut tree, parent_cell, is_left, cell_id);
                let (left, right) = node.children().expect("split node has linked children");
                stack.push((right, cell_id, false));
                stack.push((left, cell_id, true));
            }
        }

        tree.num_cell = tree.cell_type.len();
        tree.num_leaf = leaf_top as usize;
        debug!(
            "tree written: {} cells, {} leaves, depth {}",
            tree.num_cell, tree.num_leaf, tree.max_depth
        );
        debug_assert_eq!(tree.num_cell, self.num_cells());
        debug_assert_eq!(tree.num_leaf, self.num_leaves());
        tree
    }

    fn link(tree: &mut StoredTree, parent_cell: i32, is_left: bool, reference: i32) {
        if parent_cell < 0 {
            return;
        }
        if is_left {
            tree.left[parent_cell as usize] = reference;
        } else {
            tree.right[parent_cell as usize] = reference;
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;
    use crate::core::column::{FeatureColumn, FeatureKind, LabelColumn};

    fn params(cost_function: CostFunction) -> TreeParams {
        TreeParams {
            cost_function,
            num_features_for_split: 1,
            min_leaf_node: 1,
            min_split_node: 2,
            max_depth: 16,
            max_num_nodes: u32::MAX,
            random_state: 2,
        }
    }

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
    fn test_serial_build_emits_stump() {
        let dataset = binary_dataset();
        let builder = TreeBuilder::new(&dataset, params(CostFunction::Gini), None, None);
        let mut ctx = builder.make_worker_ctx(0);
        let root = builder.setup_root();
        assert!(builder.build_subtree(root, &mut ctx));

        let mut tree = builder.write_to_tree();
        tree.finalize(vec![ctx.importance], dataset.meta().num_features);

        assert_eq!(tree.num_cell, 1);
        assert_eq!(tree.num_leaf, 2);
        assert_eq!(tree.cell_kind(0), SplitKind::Continuous);
        assert!(approx_eq!(f32, tree.cell_info[0].float(), 0.5, epsilon = 1e-6));
        assert!(approx_eq!(f64, tree.final_loss, 0.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, tree.relative_loss_reduction, 1.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, tree.feature_importance[0], 1.0, epsilon = 1e-12));
    }

    #[test]
    fn test_unsplittable_root_is_single_leaf() {
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::F32(vec![0.1, 0.2, 0.3]), FeatureKind::Continuous)
            .unwrap();
        dataset.add_label(LabelColumn::Int(vec![1, 1, 1])).unwrap();
        dataset.add_class_weights(vec![1.0, 1.0]).unwrap();
        dataset.add_default_sample_weights().unwrap();

        let builder = TreeBuilder::new(&dataset, params(CostFunction::Gini), None, None);
        let mut ctx = builder.make_worker_ctx(0);
        let root = builder.setup_root();
        assert!(builder.build_subtree(root, &mut ctx));

        let tree = builder.write_to_tree();
        assert_eq!(tree.num_cell, 0);
        assert_eq!(tree.num_leaf, 1);
        assert_eq!(tree.leaf_probability[0], vec![0.0, 1.0]);
    }

    #[test]
    fn test_node_budget_converts_to_leaf() {
        // Labels alternate against the feature so a perfect tree needs
        // several cells; a budget of one stops after the first.
        let mut dataset = Dataset::new();
        dataset
            .add_feature(
                FeatureColumn::F32(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]),
                FeatureKind::Continuous,
            )
            .unwrap();
        dataset
            .add_label(LabelColumn::Int(vec![0, 0, 1, 1, 0, 0, 1, 1]))
            .unwrap();
        dataset.add_class_weights(vec![1.0, 1.0]).unwrap();
        dataset.add_default_sample_weights().unwrap();

        let mut p = params(CostFunction::Gini);
        p.max_num_nodes = 1;
        let builder = TreeBuilder::new(&dataset, p, None, None);
        let mut ctx = builder.make_worker_ctx(0);
        let root = builder.setup_root();
        assert!(builder.build_subtree(root, &mut ctx));

        let tree = builder.write_to_tree();
        assert_eq!(tree.num_cell, 1);
        assert_eq!(tree.num_leaf, 2);
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let dataset = binary_dataset();
        let mut p = params(CostFunction::Gini);
        p.max_depth = 1;
        let builder = TreeBuilder::new(&dataset, p, None, None);
        let mut ctx = builder.make_worker_ctx(0);
        let root = builder.setup_root();
        assert!(builder.build_subtree(root, &mut ctx));

        let tree = builder.write_to_tree();
        assert_eq!(tree.num_cell, 0);
        assert_eq!(tree.num_leaf, 1);
    }

    #[test]
    fn test_partition_coverage_and_monotonic_ids() {
        let mut dataset = Dataset::new();
        let x: Vec<f32> = (0..64).map(|i| (i * 37 % 64) as f32 / 64.0).collect();
        let labels: Vec<u32> = x.iter().map(|&v| u32::from(v > 0.5)).collect();
        dataset
            .add_feature(FeatureColumn::F32(x), FeatureKind::Continuous)
            .unwrap();
        dataset.add_label(LabelColumn::Int(labels)).unwrap();
        dataset.add_class_weights(vec![1.0, 1.0]).unwrap();
        dataset.add_default_sample_weights().unwrap();

        let builder = TreeBuilder::new(&dataset, params(CostFunction::Gini), None, None);
        let mut ctx = builder.make_worker_ctx(0);
        let root = builder.setup_root();
        let decision = builder.init_split(&root);
        assert_eq!(decision, SplitDecision::Serial);
        builder.find_split_all(&root, &mut ctx);
        let (left, right) = builder.do_split(&root, &mut ctx).unwrap();

        assert_eq!(left.size + right.size, 64);
        for child in [left, right] {
            let body = child.body.read().unwrap();
            let ids = body.subset.as_ref().unwrap().sample_ids().to_vec();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
