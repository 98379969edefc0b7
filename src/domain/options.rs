// ============================================================
// Layer 3 — Run Options
// ============================================================
// Small enums selecting how the model is built and called.

use serde::{Deserialize, Serialize};

/// What `SasRec::forward` returns.
///
///   Default → (pos_logits, neg_logits), each [batch, seq]
///   LogOnly → last-position features,    [batch, hidden]
///   Item    → flattened features plus pos/neg embeddings,
///             each [batch * seq, hidden]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
    #[default]
    Default,
    LogOnly,
    Item,
}

/// How the item and position tables are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingRepr {
    /// A bare trainable matrix; every row, padding included, is updated.
    RawMatrix,
    /// A lookup table whose padding row receives no gradient.
    #[default]
    IndexedTable,
}

impl EmbeddingRepr {
    /// Maps the classic `nn_parameter` switch onto a representation.
    pub fn from_nn_parameter(nn_parameter: bool) -> Self {
        if nn_parameter { Self::RawMatrix } else { Self::IndexedTable }
    }
}
