// ============================================================
// Layer 3 — Attention and Timeline Masks
// ============================================================
// Two boolean masks drive the encoder:
//
//   AttentionMask [seq, seq] — true where attention is NOT allowed.
//     Strictly upper triangular: position i sees j <= i only.
//
//        j: 0 1 2
//     i=0   . x x
//     i=1   . . x
//     i=2   . . .
//
//   TimelineMask [batch, seq] — true at padding positions (id == 0).
//     Features at these positions are zeroed after every block.
//
// Both are built on the host; the ml layer uploads them.

use crate::domain::sequence::{SequenceBatch, PADDING_ID};

/// Causal mask, `true` marks a disallowed (future) position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionMask {
    len:     usize,
    blocked: Vec<bool>,
}

impl AttentionMask {
    /// Strictly-upper-triangular mask for sequences of length `len`.
    pub fn causal(len: usize) -> Self {
        let blocked = (0..len)
            .flat_map(|i| (0..len).map(move |j| j > i))
            .collect();
        Self { len, blocked }
    }

    pub fn len(&self) -> usize { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn is_blocked(&self, query: usize, key: usize) -> bool {
        self.blocked[query * self.len + key]
    }

    /// Row-major [len, len] flags.
    pub fn as_slice(&self) -> &[bool] { &self.blocked }
}

/// Padding mask over a log-sequence batch, `true` marks padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineMask {
    dims:    [usize; 2],
    padding: Vec<bool>,
}

impl TimelineMask {
    pub fn from_batch(log_seqs: &SequenceBatch) -> Self {
        Self {
            dims:    log_seqs.dims(),
            padding: log_seqs.ids().iter().map(|&id| id == PADDING_ID).collect(),
        }
    }

    pub fn dims(&self) -> [usize; 2] { self.dims }

    pub fn is_padding(&self, b: usize, t: usize) -> bool {
        self.padding[b * self.dims[1] + t]
    }

    /// 0.0 at padding, 1.0 elsewhere; multiplying features by this
    /// zeroes padded positions.
    pub fn keep_factors(&self) -> Vec<f32> {
        self.padding.iter().map(|&p| if p { 0.0 } else { 1.0 }).collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_causal_mask_blocks_only_the_future() {
        let m = AttentionMask::causal(4);
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(m.is_blocked(i, j), j > i, "i={i} j={j}");
            }
        }
        // 4x4 strictly upper triangle has 6 entries
        assert_eq!(m.as_slice().iter().filter(|&&b| b).count(), 6);
    }

    #[test]
    fn test_single_position_sees_itself() {
        let m = AttentionMask::causal(1);
        assert!(!m.is_blocked(0, 0));
    }

    #[test]
    fn test_timeline_marks_padding() {
        let b = SequenceBatch::new(vec![vec![0, 0, 3], vec![1, 0, 2]]).unwrap();
        let m = TimelineMask::from_batch(&b);
        assert!(m.is_padding(0, 0));
        assert!(!m.is_padding(0, 2));
        assert!(m.is_padding(1, 1));
        assert_eq!(m.keep_factors(), vec![0.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
    }
}
