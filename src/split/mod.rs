//! Split descriptions and the per-node split record.

pub(crate) mod classification;
pub(crate) mod regression;
pub(crate) mod splitter;

use serde::{Deserialize, Serialize};

use crate::constants::FLOAT_ERROR;

/// What a decided split does to a sample. `Unset` means no candidate has
/// been recorded yet; `Leaf` means the node will not split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitKind {
    Unset,
    Leaf,
    /// `feature < threshold`
    Continuous,
    /// `feature <= ceiling`
    Ordinal,
    /// `feature == bin`
    OneVsAll,
    /// `(1 << feature) & mask`, cardinality at most 32
    LowCardinality,
    /// word-array bitmask indexed by `feature >> 5`
    HighCardinality,
}

impl SplitKind {
    /// Code stored in the upper byte of a stored-tree cell type.
    pub fn code(&self) -> u32 {
        match self {
            SplitKind::Continuous => 1,
            SplitKind::Ordinal => 2,
            SplitKind::OneVsAll => 3,
            SplitKind::LowCardinality => 4,
            SplitKind::HighCardinality => 5,
            SplitKind::Unset | SplitKind::Leaf => unreachable!("only decided splits are stored"),
        }
    }

    pub fn from_code(code: u32) -> SplitKind {
        match code {
            1 => SplitKind::Continuous,
            2 => SplitKind::Ordinal,
            3 => SplitKind::OneVsAll,
            4 => SplitKind::LowCardinality,
            5 => SplitKind::HighCardinality,
            _ => unreachable!("unknown split kind code {code}"),
        }
    }
}

/// The split discriminator value. Ownership of the wide bitmask is
/// explicit; replacing a recorded candidate drops the previous payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitPayload {
    None,
    Threshold(f32),
    Bin(u32),
    Mask(u32),
    WideMask(Vec<u32>),
}

/// The best split found for a node so far.
///
/// Per-feature searches report their candidates here one at a time; in
/// parallel-split mode the node's mutex serializes the reports and
/// `num_updates` counts them so the last reporter can finish the node.
#[derive(Debug)]
pub(crate) struct SplitInfo {
    pub kind: SplitKind,
    pub feature_idx: u32,
    pub gain: f64,
    pub payload: SplitPayload,
    pub num_updates: u32,
}

impl SplitInfo {
    pub fn new() -> Self {
        SplitInfo {
            kind: SplitKind::Unset,
            feature_idx: 0,
            gain: 0.0,
            payload: SplitPayload::None,
            num_updates: 0,
        }
    }

    /// Reports one per-feature search result. The candidate replaces the
    /// current record only when its gain improves by more than the float
    /// error; the report is counted either way.
    pub fn offer(&mut self, gain: f64, kind: SplitKind, feature_idx: u32, payload: SplitPayload) -> bool {
        self.num_updates += 1;
        if gain - self.gain < FLOAT_ERROR {
            return false;
        }
        self.kind = kind;
        self.feature_idx = feature_idx;
        self.gain = gain;
        self.payload = payload;
        true
    }

    /// Reports a search that produced no candidate (for example a
    /// discrete feature with a single populated bin). Counted so the
    /// parallel fan-in still completes.
    pub fn offer_none(&mut self) {
        self.num_updates += 1;
    }

    /// Demotes the node to a leaf when no search produced a meaningful
    /// gain. Called once after all per-feature searches have reported.
    pub fn finish_update(&mut self) {
        if self.gain < FLOAT_ERROR {
            self.kind = SplitKind::Leaf;
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, SplitKind::Leaf | SplitKind::Unset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_keeps_best() {
        let mut split = SplitInfo::new();
        assert!(split.offer(0.5, SplitKind::Continuous, 0, SplitPayload::Threshold(1.0)));
        assert!(!split.offer(0.4, SplitKind::Ordinal, 1, SplitPayload::Bin(2)));
        assert!(split.offer(0.9, SplitKind::OneVsAll, 2, SplitPayload::Bin(3)));
        assert_eq!(split.feature_idx, 2);
        assert_eq!(split.num_updates, 3);
    }

    #[test]
    fn test_tiny_improvement_rejected() {
        let mut split = SplitInfo::new();
        split.offer(0.5, SplitKind::Continuous, 0, SplitPayload::Threshold(1.0));
        assert!(!split.offer(0.5 + FLOAT_ERROR / 2.0, SplitKind::Continuous, 1, SplitPayload::Threshold(2.0)));
        assert_eq!(split.feature_idx, 0);
    }

    #[test]
    fn test_finish_update_demotes_zero_gain() {
        let mut split = SplitInfo::new();
        split.offer(0.0, SplitKind::Continuous, 0, SplitPayload::Threshold(1.0));
        split.finish_update();
        assert!(split.is_leaf());

        let mut split = SplitInfo::new();
        split.offer(1.0, SplitKind::Continuous, 0, SplitPayload::Threshold(1.0));
        split.finish_update();
        assert!(!split.is_leaf());
    }
}
