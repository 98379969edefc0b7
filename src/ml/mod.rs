// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Every Burn tensor and module lives in this layer. The domain
// and data layers hand over host-side SequenceBatch values; ids
// only become Tensor<B, 2, Int> here.
//
//   embedding.rs    — item / position tables (RawMatrix | IndexedTable)
//   attention.rs    — LayerNorm + causal multi-head self-attention
//   feed_forward.rs — point-wise two-layer block with residual
//   model.rs        — SasRecConfig, SasRec encoder and scoring heads
//   debug.rs        — lookup verification and gradient capture
//   trainer.rs      — masked BCE loss and the Adam loop
//   evaluator.rs    — HR@k / NDCG@k on held-out cases
//
// Reference: Kang & McAuley (2018) Self-Attentive Sequential Recommendation
//            Vaswani et al. (2017) Attention Is All You Need

pub mod embedding;

pub mod attention;

pub mod feed_forward;

/// SASRec configuration, encoder and prediction heads
pub mod model;

/// Explicit debug session for traced embedding lookups
pub mod debug;

pub mod trainer;

pub mod evaluator;
