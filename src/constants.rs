//! Hard-coded constants for thicket and its dependents.

/// Float point error. Gains below this are treated as zero and the node
/// becomes a leaf.
pub const FLOAT_ERROR: f64 = 1e-10;

/// Preference of subsetting a numerical feature's sorted order from an
/// ancestor over sorting from scratch. Subsetting wins while
/// `ancestor_size <= node_size * log2(node_size) * SUBSET_TO_SORT_RATIO`.
pub const SUBSET_TO_SORT_RATIO: f64 = 4.0;

/// Preference of memory saving at the expense of speed. A node's sorted
/// order is discarded after use when
/// `node_size * MEMORY_SAVING_FACTOR >= ancestor_size`.
pub const MEMORY_SAVING_FACTOR: f64 = 3.0;

/// Below this size a worker builds the whole subtree inline instead of
/// queueing the children for other workers.
pub const MAX_NUM_SAMPLE_FOR_SERIAL_BUILD: usize = 10_000;

/// Above this size the split search of one node fans out across features
/// instead of running serially on one worker.
pub const MAX_NUM_SAMPLE_FOR_SERIAL_SPLIT: usize = 50_000;

/// Threshold between the brute-force and the greedy heuristic splitter for
/// many-vs-many discrete features.
pub const MAX_NUM_BINS_FOR_BRUTE_SPLITTER: u32 = 8;

/// Number of bins tested per step in the move-one-bin-at-a-time greedy
/// split search.
pub const MAX_NUM_BINS_FOR_SAMPLING: u32 = 16;

/// Largest integer multiplier tried when approximating class weights for
/// the entropy cost table.
pub const MAX_ENTROPY_MULTIPLIER: f64 = 100.0;

/// Stored-tree cell type layout: the upper byte holds the split kind and
/// the lower 24 bits hold the feature index.
pub const GET_FEATURE_IDX: u32 = 0x00ff_ffff;
pub const GET_FEATURE_KIND: u32 = 0xff00_0000;
pub const CELL_KIND_SHIFT: u32 = 24;

/// Word layout of wide categorical bitmasks.
pub const NUM_BITS_PER_WORD: u32 = 32;
pub const MASK_WORD_SHIFT: u32 = 5;
pub const MASK_BIT_MASK: u32 = 31;
