// ============================================================
// Layer 5 — Masked Self-Attention Block
// ============================================================
//   Q   = LayerNorm(x)
//   out = Q + MHA(query = Q, key = x, value = x, causal mask)
//
// Keys and values come from the PRE-normalisation input and the
// residual is Q, not x. Scores are scaled by 1/sqrt(head_dim);
// masked (future) slots are filled with a large negative value
// before the softmax, so their weight underflows to zero.

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        LayerNorm, LayerNormConfig,
    },
    prelude::*,
};

use crate::domain::masks::AttentionMask;

pub(crate) const LAYER_NORM_EPS: f64 = 1e-8;

#[derive(Config, Debug)]
pub struct MaskedSelfAttentionConfig {
    pub hidden_units: usize,
    pub num_heads:    usize,
    #[config(default = 0.2)]
    pub dropout_rate: f64,
}

impl MaskedSelfAttentionConfig {
    /// `hidden_units % num_heads == 0` must already hold.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MaskedSelfAttention<B> {
        MaskedSelfAttention {
            layernorm: LayerNormConfig::new(self.hidden_units)
                .with_epsilon(LAYER_NORM_EPS)
                .init(device),
            attention: MultiHeadAttentionConfig::new(self.hidden_units, self.num_heads)
                .with_dropout(self.dropout_rate)
                .init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct MaskedSelfAttention<B: Backend> {
    layernorm: LayerNorm<B>,
    attention: MultiHeadAttention<B>,
}

impl<B: Backend> MaskedSelfAttention<B> {
    /// seqs: [batch, seq, hidden], mask: [batch, seq, seq] (true = blocked)
    pub fn forward(&self, seqs: Tensor<B, 3>, mask: Tensor<B, 3, Bool>) -> Tensor<B, 3> {
        let q   = self.layernorm.forward(seqs.clone());
        let mha = self
            .attention
            .forward(MhaInput::new(q.clone(), seqs.clone(), seqs).mask_attn(mask));
        q + mha.context
    }
}

/// Upload the causal mask, one copy per batch row → [batch, seq, seq].
pub fn causal_mask<B: Backend>(batch: usize, seq_len: usize, device: &B::Device) -> Tensor<B, 3, Bool> {
    let mask = AttentionMask::causal(seq_len);
    Tensor::<B, 2, Bool>::from_data(
        TensorData::new(mask.as_slice().to_vec(), [seq_len, seq_len]),
        device,
    )
    .unsqueeze_dim::<3>(0)
    .repeat_dim(0, batch)
}
