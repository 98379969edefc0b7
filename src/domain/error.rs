// ============================================================
// Layer 3 — Model Errors
// ============================================================
// Every failure the model core can report. None of them are
// retried inside the core: the caller decides whether to abort
// training or skip the batch.
//
// Numerical divergence found by the verification harness is
// not an error: it is logged and recorded in the debug session.

use thiserror::Error;

/// Errors produced by the SASRec model entry points.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Batch or sequence dimensions disagree with each other or with
    /// the configured `maxlen` / `hidden_units`.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what:     String,
        expected: String,
        actual:   String,
    },

    /// An id outside the valid range of an embedding table.
    #[error("{table} id {id} out of range (valid ids are 0..{bound})")]
    IndexOutOfRange {
        table: &'static str,
        id:    i64,
        bound: usize,
    },

    /// Configuration values that cannot build a model,
    /// e.g. `hidden_units` not divisible by `num_heads`.
    #[error("inconsistent configuration: {0}")]
    ConfigInconsistency(String),
}

impl ModelError {
    pub(crate) fn shape(
        what:     impl Into<String>,
        expected: impl ToString,
        actual:   impl ToString,
    ) -> Self {
        Self::ShapeMismatch {
            what:     what.into(),
            expected: expected.to_string(),
            actual:   actual.to_string(),
        }
    }
}

/// Convenience alias used by the ml layer.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let e = ModelError::IndexOutOfRange { table: "item", id: 51, bound: 51 };
        assert_eq!(e.to_string(), "item id 51 out of range (valid ids are 0..51)");

        let e = ModelError::shape("pos_seqs", "[2, 5]", "[2, 4]");
        assert!(e.to_string().contains("pos_seqs"));
        assert!(e.to_string().contains("[2, 4]"));
    }
}
