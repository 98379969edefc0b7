// ============================================================
// Layer 5 — Ranking Evaluator
// ============================================================
// Next-item ranking quality on held-out cases.
//
// Each EvalCase puts the true item first in its candidate list.
// The model scores all candidates via `predict`; the rank of the
// true item is how many candidates scored strictly higher.
//
//   HR@k   = fraction of cases with rank < k
//   NDCG@k = mean of 1 / log2(rank + 2) over cases with rank < k
//
// Runs on any backend. Pass `model.valid()` after training so that
// dropout is off.

use burn::prelude::*;

use crate::data::sampler::EvalCase;
use crate::domain::{error::ModelResult, sequence::SequenceBatch};
use crate::ml::model::SasRec;

const EVAL_BATCH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RankingMetrics {
    pub cases:     usize,
    pub hit_rate:  f64,
    pub ndcg:      f64,
}

/// Number of scores strictly greater than `scores[0]`.
pub fn rank_of_first(scores: &[f32]) -> usize {
    match scores.split_first() {
        Some((target, rest)) => rest.iter().filter(|s| *s > target).count(),
        None                 => 0,
    }
}

/// Fold per-case ranks into HR@k / NDCG@k.
pub fn summarize(ranks: &[usize], k: usize) -> RankingMetrics {
    if ranks.is_empty() {
        return RankingMetrics::default();
    }
    let (hits, gain) = ranks
        .iter()
        .filter(|&&r| r < k)
        .fold((0usize, 0.0f64), |(h, g), &r| (h + 1, g + 1.0 / ((r + 2) as f64).log2()));

    let n = ranks.len() as f64;
    RankingMetrics {
        cases:    ranks.len(),
        hit_rate: hits as f64 / n,
        ndcg:     gain / n,
    }
}

/// Score every case and return HR@k / NDCG@k.
/// All cases must share one candidate count.
pub fn evaluate<B: Backend>(
    model: &SasRec<B>,
    cases: &[EvalCase],
    k:     usize,
) -> ModelResult<RankingMetrics> {
    let mut ranks = Vec::with_capacity(cases.len());

    for chunk in cases.chunks(EVAL_BATCH) {
        let user_ids: Vec<i64> = chunk.iter().map(|c| c.user_id).collect();
        let logs       = SequenceBatch::new(chunk.iter().map(|c| c.log.clone()).collect())?;
        let candidates = SequenceBatch::new(chunk.iter().map(|c| c.candidates.clone()).collect())?;

        let logits = model.predict(&user_ids, &logs, &candidates, None)?;
        let scores: Vec<f32> = logits.into_data().iter::<f32>().collect();

        ranks.extend(scores.chunks(candidates.seq_len()).map(rank_of_first));
    }

    let metrics = summarize(&ranks, k);
    tracing::info!(
        "Eval: {} cases, HR@{k}={:.4}, NDCG@{k}={:.4}",
        metrics.cases, metrics.hit_rate, metrics.ndcg,
    );
    Ok(metrics)
}
