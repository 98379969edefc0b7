// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Short Adam training runs on sampled batches.
//
// Objective (binary cross-entropy with logits, per position t
// where the positive id is not padding):
//
//   loss = -( Σ log σ(pos_t) + Σ log σ(-neg_t) ) / #non-padding
//
// Backend split:
//   - training runs on an AutodiffBackend (dropout active)
//   - model.valid() gives the inner backend for evaluation
//
// When a DebugSession is passed, its lookup gradients are
// collected right after each backward pass, before the
// optimiser consumes them.

use anyhow::Result;
use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation::log_sigmoid, backend::AutodiffBackend},
};

use crate::data::sampler::UserSampler;
use crate::domain::{masks::TimelineMask, sequence::SequenceBatch};
use crate::infra::metrics::StepMetrics;
use crate::ml::{debug::DebugSession, model::SasRec};

/// Knobs for `train_steps`.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub steps:      usize,
    pub batch_size: usize,
    pub lr:         f64,
}

/// Masked BCE over [batch, seq] logits; padding positions of `pos_seqs`
/// contribute nothing. Returns a single-element tensor.
pub fn masked_bce_loss<B: Backend>(
    pos_logits: Tensor<B, 2>,
    neg_logits: Tensor<B, 2>,
    pos_seqs:   &SequenceBatch,
) -> Tensor<B, 1> {
    let device = pos_logits.device();
    let keep   = Tensor::<B, 2>::from_data(
        TensorData::new(TimelineMask::from_batch(pos_seqs).keep_factors(), pos_seqs.dims()),
        &device,
    );
    let count = pos_seqs.non_padding_count().max(1) as f64;

    let pos_term = log_sigmoid(pos_logits);
    let neg_term = log_sigmoid(neg_logits.neg());
    ((pos_term + neg_term) * keep).sum().neg().div_scalar(count)
}

/// Run `opts.steps` Adam updates. Returns the trained model and one
/// metrics row per step.
pub fn train_steps<B: AutodiffBackend>(
    mut model:  SasRec<B>,
    sampler:    &mut UserSampler,
    opts:       &TrainOptions,
    mut debug:  Option<&mut DebugSession<B>>,
) -> Result<(SasRec<B>, Vec<StepMetrics>)> {
    // m = β1*m + (1-β1)*g,  v = β2*v + (1-β2)*g²,  θ -= lr * m / (√v + ε)
    let mut optim = AdamConfig::new()
        .with_beta_2(0.98)
        .with_epsilon(1e-8)
        .init();

    let mut history = Vec::with_capacity(opts.steps);

    for step in 1..=opts.steps {
        let batch = sampler.next_batch(opts.batch_size)?;

        let (pos_logits, neg_logits) = model.pair_logits(
            &batch.user_ids,
            &batch.log_seqs,
            &batch.pos_seqs,
            &batch.neg_seqs,
            debug.as_deref_mut(),
        )?;
        let loss     = masked_bce_loss(pos_logits, neg_logits, &batch.pos_seqs);
        let loss_val = loss.clone().into_scalar().elem::<f64>();
        if !loss_val.is_finite() {
            tracing::warn!("step {step}: non-finite loss {loss_val}");
        }

        let grads    = loss.backward();
        let captured = match debug.as_deref_mut() {
            Some(session) => session.collect_gradients(&grads),
            None          => 0,
        };
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(opts.lr, model, grads);

        tracing::debug!("step {step}/{}: loss={loss_val:.4}, captured={captured}", opts.steps);
        history.push(StepMetrics::new(step, loss_val, captured));
    }

    if let Some(last) = history.last() {
        tracing::info!("Trained {} steps, final loss {:.4}", last.step, last.loss);
    }
    Ok((model, history))
}
