// ============================================================
// Layer 3 — SequenceBatch Domain Type
// ============================================================
// A rectangular batch of item ids, shape [batch_size, seq_len],
// stored row-major on the host.
//
// Used for:
//   - log sequences   (a user's past interactions, left-padded)
//   - pos / neg seqs  (next-item targets and sampled negatives)
//   - candidate lists (items to score in `predict`)
//
// Id 0 is the padding id. A log sequence with three real items
// and maxlen 5 looks like:
//
//   [0, 0, 3, 7, 12]
//    ^^^^ padding, masked out of attention and feed-forward

use serde::{Deserialize, Serialize};

use crate::domain::error::{ModelError, ModelResult};

/// The id reserved for padding positions.
pub const PADDING_ID: i64 = 0;

/// Row-major [batch_size, seq_len] block of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceBatch {
    ids:        Vec<i64>,
    batch_size: usize,
    seq_len:    usize,
}

impl SequenceBatch {
    /// Build a batch from rows. All rows must have the same, non-zero length.
    pub fn new(rows: Vec<Vec<i64>>) -> ModelResult<Self> {
        let batch_size = rows.len();
        let seq_len    = rows.first().map(Vec::len).unwrap_or(0);

        if let Some(bad) = rows.iter().find(|r| r.len() != seq_len) {
            return Err(ModelError::shape("sequence row length", seq_len, bad.len()));
        }

        let ids = rows.into_iter().flatten().collect();
        Self::from_flat(ids, batch_size, seq_len)
    }

    /// Build a batch from a flat row-major buffer.
    pub fn from_flat(ids: Vec<i64>, batch_size: usize, seq_len: usize) -> ModelResult<Self> {
        if batch_size == 0 || seq_len == 0 {
            return Err(ModelError::shape(
                "sequence batch",
                "non-empty [batch, seq]",
                format!("[{batch_size}, {seq_len}]"),
            ));
        }
        if ids.len() != batch_size * seq_len {
            return Err(ModelError::shape(
                "flat id buffer length",
                batch_size * seq_len,
                ids.len(),
            ));
        }
        Ok(Self { ids, batch_size, seq_len })
    }

    pub fn batch_size(&self) -> usize { self.batch_size }

    pub fn seq_len(&self) -> usize { self.seq_len }

    pub fn dims(&self) -> [usize; 2] { [self.batch_size, self.seq_len] }

    /// All ids, row-major.
    pub fn ids(&self) -> &[i64] { &self.ids }

    pub fn row(&self, b: usize) -> &[i64] {
        &self.ids[b * self.seq_len..(b + 1) * self.seq_len]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[i64]> {
        self.ids.chunks(self.seq_len)
    }

    /// Position indices 0..seq_len, identical for every row.
    pub fn positions(&self) -> SequenceBatch {
        let ids = (0..self.batch_size)
            .flat_map(|_| 0..self.seq_len as i64)
            .collect();
        SequenceBatch {
            ids,
            batch_size: self.batch_size,
            seq_len:    self.seq_len,
        }
    }

    /// Number of non-padding entries in the whole batch.
    pub fn non_padding_count(&self) -> usize {
        self.ids.iter().filter(|&&id| id != PADDING_ID).count()
    }

    /// Fails with `IndexOutOfRange` on the first id outside `0..bound`.
    pub fn check_range(&self, table: &'static str, bound: usize) -> ModelResult<()> {
        match self.ids.iter().find(|&&id| id < 0 || id as usize >= bound) {
            Some(&id) => Err(ModelError::IndexOutOfRange { table, id, bound }),
            None      => Ok(()),
        }
    }

    /// Fails with `ShapeMismatch` unless this batch has exactly `dims`.
    pub fn expect_dims(&self, what: &str, dims: [usize; 2]) -> ModelResult<()> {
        if self.dims() != dims {
            return Err(ModelError::shape(what, format!("{dims:?}"), format!("{:?}", self.dims())));
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_stored_row_major() {
        let b = SequenceBatch::new(vec![vec![0, 1, 2], vec![3, 4, 5]]).unwrap();
        assert_eq!(b.dims(), [2, 3]);
        assert_eq!(b.ids(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(b.row(1), &[3, 4, 5]);
        assert_eq!(b.rows().count(), 2);
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let err = SequenceBatch::new(vec![vec![1, 2, 3], vec![1, 2]]).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        assert!(SequenceBatch::new(Vec::new()).is_err());
        assert!(SequenceBatch::new(vec![Vec::new()]).is_err());
    }

    #[test]
    fn test_positions_repeat_per_row() {
        let b = SequenceBatch::new(vec![vec![0, 0, 9], vec![4, 5, 6]]).unwrap();
        assert_eq!(b.positions().ids(), &[0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_range_check_reports_first_offender() {
        let b = SequenceBatch::new(vec![vec![0, 3, 51, -1]]).unwrap();
        assert_eq!(
            b.check_range("item", 51),
            Err(ModelError::IndexOutOfRange { table: "item", id: 51, bound: 51 })
        );
        assert!(b.check_range("item", 52).is_err()); // -1 still invalid
        let ok = SequenceBatch::new(vec![vec![0, 3, 50]]).unwrap();
        assert!(ok.check_range("item", 51).is_ok());
    }

    #[test]
    fn test_non_padding_count() {
        let b = SequenceBatch::new(vec![vec![0, 0, 3, 7, 12]]).unwrap();
        assert_eq!(b.non_padding_count(), 3);
    }
}
