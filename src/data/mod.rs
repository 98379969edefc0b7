// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From user interaction histories to host-side id batches:
//
//   histories (chronological item ids per user)
//       │
//       ├──► UserSampler    → TrainBatch (log / pos / neg)
//       │
//       └──► build_eval_case → EvalCase (held-out item + negatives)
//
// Real interaction-log ingestion is out of scope; smoke runs use
// `synthetic_histories`.

/// Right-aligned training examples, negatives, eval cases
pub mod sampler;
