//! Tree nodes and the arena that owns them.
//!
//! Nodes live in an append-only arena and refer to each other by index:
//! children are owned by their arena slot and the parent link is a plain
//! index, so the graph stays a DAG with no back-owning edges. The mutable
//! body (subset and stats) sits behind a `RwLock` because parallel-split
//! jobs read a node's rows concurrently while descendants read ancestor
//! sorted orders; everything else is either immutable after creation or
//! an atomic flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::core::stats::NodeStats;
use crate::core::subset::Subset;
use crate::split::SplitInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Root,
    LeftChild,
    RightChild,
}

#[derive(Debug)]
pub(crate) struct NodeBody {
    pub subset: Option<Subset>,
    pub stats: Option<NodeStats>,
}

#[derive(Debug)]
pub(crate) struct TreeNode {
    pub node_id: u32,
    pub kind: NodeKind,
    /// Root depth is one; `max_depth` compares against this.
    pub depth: u32,
    pub parent: Option<u32>,
    pub size: usize,
    pub body: RwLock<NodeBody>,
    pub split: Mutex<SplitInfo>,
    children: OnceLock<(u32, u32)>,
    left_processed: AtomicBool,
    right_processed: AtomicBool,
}

impl TreeNode {
    fn new(node_id: u32, kind: NodeKind, depth: u32, parent: Option<u32>, subset: Subset) -> TreeNode {
        TreeNode {
            node_id,
            kind,
            depth,
            parent,
            size: subset.size(),
            body: RwLock::new(NodeBody {
                subset: Some(subset),
                stats: None,
            }),
            split: Mutex::new(SplitInfo::new()),
            children: OnceLock::new(),
            left_processed: AtomicBool::new(false),
            right_processed: AtomicBool::new(false),
        }
    }

    pub fn children(&self) -> Option<(u32, u32)> {
        self.children.get().copied()
    }

    pub fn set_children(&self, left: u32, right: u32) {
        self.children
            .set((left, right))
            .expect("children are linked exactly once");
    }

    pub fn mark_child_processed(&self, child_kind: NodeKind) {
        match child_kind {
            NodeKind::LeftChild => self.left_processed.store(true, Ordering::SeqCst),
            NodeKind::RightChild => self.right_processed.store(true, Ordering::SeqCst),
            NodeKind::Root => unreachable!("the root is nobody's child"),
        }
    }

    pub fn both_children_processed(&self) -> bool {
        self.left_processed.load(Ordering::SeqCst) && self.right_processed.load(Ordering::SeqCst)
    }
}

/// Append-only store of every node of one tree.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: RwLock<Vec<Arc<TreeNode>>>,
}

impl NodeArena {
    pub fn new() -> Self {
        NodeArena::default()
    }

    pub fn push_root(&self, subset: Subset) -> Arc<TreeNode> {
        self.push(NodeKind::Root, 1, None, subset)
    }

    pub fn push(&self, kind: NodeKind, depth: u32, parent: Option<u32>, subset: Subset) -> Arc<TreeNode> {
        let mut nodes = self.nodes.write().unwrap();
        let node = Arc::new(TreeNode::new(nodes.len() as u32, kind, depth, parent, subset));
        nodes.push(Arc::clone(&node));
        node
    }

    pub fn get(&self, node_id: u32) -> Arc<TreeNode> {
        Arc::clone(&self.nodes.read().unwrap()[node_id as usize])
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::column::{FeatureColumn, FeatureKind, LabelColumn};
    use crate::core::dataset::Dataset;

    fn root_subset() -> (Dataset, Subset) {
        let mut dataset = Dataset::new();
        dataset
            .add_feature(FeatureColumn::F32(vec![0.0, 1.0]), FeatureKind::Continuous)
            .unwrap();
        dataset.add_label(LabelColumn::Int(vec![0, 1])).unwrap();
        dataset.add_class_weights(vec![1.0, 1.0]).unwrap();
        dataset.add_default_sample_weights().unwrap();
        let subset = Subset::make_root(&dataset);
        (dataset, subset)
    }

    #[test]
    fn test_arena_ids_are_dense() {
        let (_dataset, subset) = root_subset();
        let arena = NodeArena::new();
        let root = arena.push_root(subset);
        assert_eq!(root.node_id, 0);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(0).node_id, 0);
    }

    #[test]
    fn test_processed_flags() {
        let (_dataset, subset) = root_subset();
        let arena = NodeArena::new();
        let root = arena.push_root(subset);
        assert!(!root.both_children_processed());
        root.mark_child_processed(NodeKind::LeftChild);
        assert!(!root.both_children_processed());
        root.mark_child_processed(NodeKind::RightChild);
        assert!(root.both_children_processed());
    }
}
