//! The worker pool and the ordered job queue that drive a parallel build.
//!
//! Jobs are totally ordered: first by kind, then by the kind-specific
//! tie-break, and split jobs for decided nodes run largest-gain first.
//! The queue is an ordered set under a mutex with a condvar for blocking
//! polls; job granularity is coarse (a node or a feature of a node), so
//! queue contention is negligible next to the work each job carries.
//!
//! Two parallel modes compose here. In parallel build, a worker that
//! splits a node hands the smaller child to the queue and keeps the
//! larger one, and below a size cutoff it finishes the whole subtree
//! inline. In parallel split, a node too large for one worker fans its
//! per-feature searches out as individual jobs; the report that completes
//! the count re-enqueues the decided node.

use std::cmp::Reverse;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::debug;
use priority_queue::PriorityQueue;

use crate::constants::MAX_NUM_SAMPLE_FOR_SERIAL_BUILD;
use crate::core::node::TreeNode;
use crate::stored::StoredTree;
use crate::train::builder::{SplitDecision, TreeBuilder, WorkerCtx};

/// Job kinds in polling order: smaller codes run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum JobKind {
    WriteToTree = 1,
    SplitOnFeature = 2,
    SplitProcessedNode = 3,
    SplitRawNode = 4,
    SetupRoot = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Job {
    kind: JobKind,
    node_id: u32,
    feature_idx: u32,
}

impl Job {
    fn setup_root() -> Job {
        Job {
            kind: JobKind::SetupRoot,
            node_id: 0,
            feature_idx: 0,
        }
    }

    fn split_raw_node(node_id: u32) -> Job {
        Job {
            kind: JobKind::SplitRawNode,
            node_id,
            feature_idx: 0,
        }
    }

    fn split_processed_node(node_id: u32) -> Job {
        Job {
            kind: JobKind::SplitProcessedNode,
            node_id,
            feature_idx: 0,
        }
    }

    fn split_on_feature(node_id: u32, feature_idx: u32) -> Job {
        Job {
            kind: JobKind::SplitOnFeature,
            node_id,
            feature_idx,
        }
    }

    fn write_to_tree() -> Job {
        Job {
            kind: JobKind::WriteToTree,
            node_id: 0,
            feature_idx: 0,
        }
    }

    /// Rank in polling order. Feature jobs tie-break on the feature,
    /// decided-node jobs on descending gain (gains are finite and
    /// non-negative, so inverted bits order them), the rest on identity.
    fn rank(&self, gain: f64) -> JobRank {
        JobRank {
            kind: self.kind as u8,
            feature_idx: self.feature_idx,
            gain_rank: if self.kind == JobKind::SplitProcessedNode {
                !gain.to_bits()
            } else {
                0
            },
            node_id: self.node_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct JobRank {
    kind: u8,
    feature_idx: u32,
    gain_rank: u64,
    node_id: u32,
}

/// Blocking ordered job queue. `poll` takes the least job or parks until
/// one arrives; `finish` wakes every parked worker with `None`.
struct JobQueue {
    jobs: Mutex<PriorityQueue<Job, Reverse<JobRank>>>,
    available: Condvar,
    finished: AtomicBool,
}

impl JobQueue {
    fn new() -> JobQueue {
        JobQueue {
            jobs: Mutex::new(PriorityQueue::new()),
            available: Condvar::new(),
            finished: AtomicBool::new(false),
        }
    }

    fn offer(&self, job: Job, gain: f64) {
        let rank = job.rank(gain);
        self.jobs.lock().unwrap().push(job, Reverse(rank));
        self.available.notify_one();
    }

    fn poll(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        loop {
            if let Some((job, _)) = jobs.pop() {
                return Some(job);
            }
            if self.finished.load(Ordering::SeqCst) {
                return None;
            }
            jobs = self.available.wait(jobs).unwrap();
        }
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.available.notify_all();
    }
}

pub(crate) struct ParallelDriver<'a> {
    builder: &'a TreeBuilder<'a>,
    queue: JobQueue,
    tree_slot: Mutex<Option<StoredTree>>,
    /// A worker that panics parks its payload here and finishes the
    /// queue so its peers drain; the driver rethrows after the join.
    panic_slot: Mutex<Option<Box<dyn std::any::Any + Send>>>,
}

impl<'a> ParallelDriver<'a> {
    pub fn new(builder: &'a TreeBuilder<'a>) -> Self {
        ParallelDriver {
            builder,
            queue: JobQueue::new(),
            tree_slot: Mutex::new(None),
            panic_slot: Mutex::new(None),
        }
    }

    /// Runs the pool to completion and returns the stored tree with its
    /// importance reduced over every worker's accumulator.
    pub fn build(&self, num_threads: usize) -> StoredTree {
        debug!("parallel build with {num_threads} workers");
        self.queue.offer(Job::setup_root(), 0.0);

        let importances: Vec<Vec<f64>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..num_threads)
                .map(|worker_id| {
                    scope.spawn(move || {
                        let mut ctx = self.builder.make_worker_ctx(worker_id);
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.run(&mut ctx))) {
                            *self.panic_slot.lock().unwrap() = Some(payload);
                            self.queue.finish();
                        }
                        ctx.importance
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("worker accumulators survive"))
                .collect()
        });

        if let Some(payload) = self.panic_slot.lock().unwrap().take() {
            panic::resume_unwind(payload);
        }

        let mut tree = self
            .tree_slot
            .lock()
            .unwrap()
            .take()
            .expect("the write-to-tree job ran");
        tree.finalize(importances, self.builder.dataset.meta().num_features);
        tree
    }

    fn run(&self, ctx: &mut WorkerCtx) {
        let mut job = self.queue.poll();
        while let Some(current) = job {
            let inline_next = self.dispatch(current, ctx);
            job = match inline_next {
                Some(next) => Some(next),
                None => self.queue.poll(),
            };
        }
    }

    /// Executes one job. A returned job continues on this worker without
    /// touching the queue (the work-stealing imbalance fix keeps the
    /// larger child local).
    fn dispatch(&self, job: Job, ctx: &mut WorkerCtx) -> Option<Job> {
        match job.kind {
            JobKind::SetupRoot => {
                let root = self.builder.setup_root();
                Some(Job::split_raw_node(root.node_id))
            }
            JobKind::SplitRawNode => self.split_raw_node(job.node_id, ctx),
            JobKind::SplitProcessedNode => {
                let node = self.builder.arena.get(job.node_id);
                self.split_processed_node(&node, ctx)
            }
            JobKind::SplitOnFeature => {
                self.split_one_feature(job, ctx);
                None
            }
            JobKind::WriteToTree => {
                *self.tree_slot.lock().unwrap() = Some(self.builder.write_to_tree());
                self.queue.finish();
                None
            }
        }
    }

    fn split_raw_node(&self, node_id: u32, ctx: &mut WorkerCtx) -> Option<Job> {
        let node = self.builder.arena.get(node_id);
        if node.size <= MAX_NUM_SAMPLE_FOR_SERIAL_BUILD {
            if self.builder.build_subtree(node, ctx) {
                self.queue.offer(Job::write_to_tree(), 0.0);
            }
            return None;
        }
        match self.builder.init_split(&node) {
            SplitDecision::Leaf => {
                self.make_leaf(&node);
                None
            }
            SplitDecision::FanOut => {
                for feature_idx in self.builder.sample_features(ctx) {
                    self.queue.offer(Job::split_on_feature(node_id, feature_idx), 0.0);
                }
                None
            }
            SplitDecision::Serial => {
                self.builder.find_split_all(&node, ctx);
                self.split_processed_node(&node, ctx)
            }
        }
    }

    fn split_processed_node(&self, node: &Arc<TreeNode>, ctx: &mut WorkerCtx) -> Option<Job> {
        if node.split.lock().unwrap().is_leaf() {
            self.make_leaf(node);
            return None;
        }
        match self.builder.do_split(node, ctx) {
            None => {
                // Node budget exhausted; the split was demoted to a leaf.
                self.make_leaf(node);
                None
            }
            Some((left, right)) => {
                let (smaller, larger) = if left.size <= right.size {
                    (left, right)
                } else {
                    (right, left)
                };
                self.queue.offer(Job::split_raw_node(smaller.node_id), 0.0);
                Some(Job::split_raw_node(larger.node_id))
            }
        }
    }

    /// One fanned-out feature search. The report that brings the count to
    /// the sampled-feature total finishes the node and re-enqueues it,
    /// prioritized by its gain.
    fn split_one_feature(&self, job: Job, ctx: &mut WorkerCtx) {
        let node = self.builder.arena.get(job.node_id);
        self.builder.find_split_one(&node, job.feature_idx as usize, ctx);

        let mut split = node.split.lock().unwrap();
        if split.num_updates == self.builder.params.num_features_for_split {
            split.num_updates = 0;
            split.finish_update();
            let gain = split.gain;
            drop(split);
            self.queue.offer(Job::split_processed_node(job.node_id), gain);
        }
    }

    fn make_leaf(&self, node: &Arc<TreeNode>) {
        if self.builder.make_leaf(node) {
            self.queue.offer(Job::write_to_tree(), 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_order() {
        let write = Job::write_to_tree().rank(0.0);
        let feature_low = Job::split_on_feature(7, 1).rank(0.0);
        let feature_high = Job::split_on_feature(3, 5).rank(0.0);
        let processed_small = Job::split_processed_node(1).rank(0.5);
        let processed_large = Job::split_processed_node(2).rank(2.0);
        let raw = Job::split_raw_node(0).rank(0.0);
        let root = Job::setup_root().rank(0.0);

        assert!(write < feature_low);
        // Feature jobs tie-break on the feature index.
        assert!(feature_low < feature_high);
        // Largest gain first among decided nodes.
        assert!(processed_large < processed_small);
        assert!(processed_small < raw);
        assert!(raw < root);
    }

    #[test]
    fn test_queue_polls_in_rank_order() {
        let queue = JobQueue::new();
        queue.offer(Job::split_raw_node(4), 0.0);
        queue.offer(Job::split_processed_node(1), 0.25);
        queue.offer(Job::split_processed_node(2), 4.0);
        queue.offer(Job::split_on_feature(9, 0), 0.0);

        assert_eq!(queue.poll().unwrap(), Job::split_on_feature(9, 0));
        assert_eq!(queue.poll().unwrap(), Job::split_processed_node(2));
        assert_eq!(queue.poll().unwrap(), Job::split_processed_node(1));
        assert_eq!(queue.poll().unwrap(), Job::split_raw_node(4));

        queue.finish();
        assert!(queue.poll().is_none());
    }
}
