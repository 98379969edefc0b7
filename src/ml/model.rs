// ============================================================
// Layer 5 — SASRec Model
// ============================================================
// Self-attentive sequential recommendation:
//
//   ids ──► item_emb · sqrt(hidden) + pos_emb ──► dropout ──► zero padding
//        ──► num_blocks × [ MaskedSelfAttention
//                           LayerNorm → PointWiseFeedForward
//                           zero padding ]
//        ──► final LayerNorm ──► features [batch, seq, hidden]
//
// Three entry points for the surrounding training / inference driver:
//   encode   — the features above
//   forward  — Default / LogOnly / Item modes (see ForwardMode)
//   predict  — logits for candidate items from the last position
//
// Every id and shape is validated on the host before a tensor is
// built; failures come back as ModelError, never as a panic.

use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig},
    prelude::*,
};

use crate::domain::{
    error::{ModelError, ModelResult},
    masks::TimelineMask,
    options::{EmbeddingRepr, ForwardMode},
    sequence::SequenceBatch,
};
use crate::ml::{
    attention::{causal_mask, MaskedSelfAttention, MaskedSelfAttentionConfig, LAYER_NORM_EPS},
    debug::{CallSite, DebugSession},
    embedding::{EmbeddingStore, TableKind},
    feed_forward::{PointWiseFeedForward, PointWiseFeedForwardConfig},
};

const LOG_SEQS:     CallSite = CallSite::new("log2feats", "log_seqs");
const POSITIONS:    CallSite = CallSite::new("log2feats", "positions");
const POS_SEQS:     CallSite = CallSite::new("forward", "pos_seqs");
const NEG_SEQS:     CallSite = CallSite::new("forward", "neg_seqs");
const ITEM_INDICES: CallSite = CallSite::new("predict", "item_indices");

#[derive(Config, Debug)]
pub struct SasRecConfig {
    pub user_num: usize,
    pub item_num: usize,
    #[config(default = 50)]
    pub hidden_units: usize,
    #[config(default = 200)]
    pub maxlen: usize,
    #[config(default = 2)]
    pub num_blocks: usize,
    #[config(default = 1)]
    pub num_heads: usize,
    #[config(default = 0.2)]
    pub dropout_rate: f64,
    #[config(default = "EmbeddingRepr::IndexedTable")]
    pub embedding: EmbeddingRepr,
}

impl SasRecConfig {
    pub fn validate(&self) -> ModelResult<()> {
        let sizes = [
            ("item_num", self.item_num),
            ("hidden_units", self.hidden_units),
            ("maxlen", self.maxlen),
            ("num_heads", self.num_heads),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(ModelError::ConfigInconsistency(format!("{name} must be > 0")));
        }
        if self.hidden_units % self.num_heads != 0 {
            return Err(ModelError::ConfigInconsistency(format!(
                "hidden_units ({}) must be divisible by num_heads ({})",
                self.hidden_units, self.num_heads
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ModelError::ConfigInconsistency(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ModelResult<SasRec<B>> {
        self.validate()?;

        // Row 0 of the item table is padding
        let item_emb = EmbeddingStore::new(
            self.embedding, self.item_num + 1, self.hidden_units, Some(0), device,
        );
        let pos_emb = EmbeddingStore::new(
            self.embedding, self.maxlen, self.hidden_units, None, device,
        );
        let blocks = (0..self.num_blocks)
            .map(|_| self.build_block(device))
            .collect();

        tracing::debug!(
            "SASRec: {} blocks, hidden={}, heads={}, maxlen={}, items={}, {:?}",
            self.num_blocks, self.hidden_units, self.num_heads,
            self.maxlen, self.item_num, self.embedding,
        );

        Ok(SasRec {
            item_emb,
            pos_emb,
            emb_dropout: DropoutConfig::new(self.dropout_rate).init(),
            blocks,
            last_layernorm: self.layer_norm(device),
            user_num:     self.user_num,
            item_num:     self.item_num,
            hidden_units: self.hidden_units,
            maxlen:       self.maxlen,
        })
    }

    fn build_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        EncoderBlock {
            attention: MaskedSelfAttentionConfig::new(self.hidden_units, self.num_heads)
                .with_dropout_rate(self.dropout_rate)
                .init(device),
            forward_layernorm: self.layer_norm(device),
            feed_forward: PointWiseFeedForwardConfig::new(self.hidden_units)
                .with_dropout_rate(self.dropout_rate)
                .init(device),
        }
    }

    fn layer_norm<B: Backend>(&self, device: &B::Device) -> LayerNorm<B> {
        LayerNormConfig::new(self.hidden_units)
            .with_epsilon(LAYER_NORM_EPS)
            .init(device)
    }
}

/// One attention + feed-forward stage of the block stack.
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    attention:         MaskedSelfAttention<B>,
    forward_layernorm: LayerNorm<B>,
    feed_forward:      PointWiseFeedForward<B>,
}

impl<B: Backend> EncoderBlock<B> {
    /// `keep` is 0 at padding and 1 elsewhere, already [batch, seq, hidden].
    pub fn forward(
        &self,
        seqs: Tensor<B, 3>,
        mask: Tensor<B, 3, Bool>,
        keep: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let seqs = self.attention.forward(seqs, mask);
        let seqs = self.forward_layernorm.forward(seqs);
        let seqs = self.feed_forward.forward(seqs);
        seqs * keep
    }
}

#[derive(Module, Debug)]
pub struct SasRec<B: Backend> {
    item_emb:       EmbeddingStore<B>,
    pos_emb:        EmbeddingStore<B>,
    emb_dropout:    Dropout,
    blocks:         Vec<EncoderBlock<B>>,
    last_layernorm: LayerNorm<B>,
    user_num:       usize,
    item_num:       usize,
    hidden_units:   usize,
    maxlen:         usize,
}

/// What `SasRec::forward` returns, per `ForwardMode`.
#[derive(Debug, Clone)]
pub enum ForwardOutput<B: Backend> {
    /// Default: [batch, seq] dot-product logits.
    Logits {
        pos_logits: Tensor<B, 2>,
        neg_logits: Tensor<B, 2>,
    },
    /// LogOnly: [batch, hidden] features at the last position.
    LastFeatures(Tensor<B, 2>),
    /// Item: everything flattened to [batch * seq, hidden].
    Flattened {
        log_feats: Tensor<B, 2>,
        pos_embs:  Tensor<B, 2>,
        neg_embs:  Tensor<B, 2>,
    },
}

impl<B: Backend> SasRec<B> {
    pub fn item_num(&self) -> usize { self.item_num }

    pub fn user_num(&self) -> usize { self.user_num }

    pub fn hidden_units(&self) -> usize { self.hidden_units }

    pub fn maxlen(&self) -> usize { self.maxlen }

    pub fn num_blocks(&self) -> usize { self.blocks.len() }

    pub fn repr(&self) -> EmbeddingRepr { self.item_emb.repr() }

    pub fn item_embedding(&self) -> &EmbeddingStore<B> { &self.item_emb }

    pub fn position_embedding(&self) -> &EmbeddingStore<B> { &self.pos_emb }

    pub fn device(&self) -> B::Device { self.item_emb.device() }

    /// Same weights, other embedding representation.
    pub fn into_representation(self, repr: EmbeddingRepr) -> Self {
        Self {
            item_emb: self.item_emb.into_repr(repr, Some(0)),
            pos_emb:  self.pos_emb.into_repr(repr, None),
            ..self
        }
    }

    /// Per-position features for a batch of log sequences.
    pub fn encode(&self, log_seqs: &SequenceBatch) -> ModelResult<Tensor<B, 3>> {
        self.log2feats(log_seqs, None)
    }

    /// `encode` with optional lookup tracing.
    pub fn encode_with(
        &self,
        log_seqs: &SequenceBatch,
        debug:    Option<&mut DebugSession<B>>,
    ) -> ModelResult<Tensor<B, 3>> {
        self.log2feats(log_seqs, debug)
    }

    pub fn forward(
        &self,
        user_ids: &[i64],
        log_seqs: &SequenceBatch,
        pos_seqs: &SequenceBatch,
        neg_seqs: &SequenceBatch,
        mode:     ForwardMode,
        mut debug: Option<&mut DebugSession<B>>,
    ) -> ModelResult<ForwardOutput<B>> {
        self.check_users(user_ids, log_seqs)?;
        if mode == ForwardMode::LogOnly {
            let log_feats = self.log2feats(log_seqs, debug)?;
            return Ok(ForwardOutput::LastFeatures(last_position(log_feats)));
        }

        let (log_feats, pos_embs, neg_embs) =
            self.encode_pairs(log_seqs, pos_seqs, neg_seqs, debug.as_deref_mut())?;

        match mode {
            ForwardMode::Item => {
                let [batch, seq, hidden] = log_feats.dims();
                let flat = [batch * seq, hidden];
                Ok(ForwardOutput::Flattened {
                    log_feats: log_feats.reshape(flat),
                    pos_embs:  pos_embs.reshape(flat),
                    neg_embs:  neg_embs.reshape(flat),
                })
            }
            _ => Ok(ForwardOutput::Logits {
                pos_logits: dot_last(log_feats.clone(), pos_embs),
                neg_logits: dot_last(log_feats, neg_embs),
            }),
        }
    }

    /// Default-mode `forward`, returning `(pos_logits, neg_logits)` directly.
    pub fn pair_logits(
        &self,
        user_ids: &[i64],
        log_seqs: &SequenceBatch,
        pos_seqs: &SequenceBatch,
        neg_seqs: &SequenceBatch,
        debug:    Option<&mut DebugSession<B>>,
    ) -> ModelResult<(Tensor<B, 2>, Tensor<B, 2>)> {
        self.check_users(user_ids, log_seqs)?;
        let (log_feats, pos_embs, neg_embs) =
            self.encode_pairs(log_seqs, pos_seqs, neg_seqs, debug)?;
        Ok((dot_last(log_feats.clone(), pos_embs), dot_last(log_feats, neg_embs)))
    }

    /// Raw logits [batch, k] for `item_indices` [batch, k]; no softmax.
    pub fn predict(
        &self,
        user_ids:     &[i64],
        log_seqs:     &SequenceBatch,
        item_indices: &SequenceBatch,
        mut debug:    Option<&mut DebugSession<B>>,
    ) -> ModelResult<Tensor<B, 2>> {
        self.check_users(user_ids, log_seqs)?;
        if item_indices.batch_size() != log_seqs.batch_size() {
            return Err(ModelError::shape(
                "item_indices batch",
                log_seqs.batch_size(),
                item_indices.batch_size(),
            ));
        }
        item_indices.check_range(TableKind::Item.name(), self.item_num + 1)?;

        let final_feat = last_position(self.log2feats(log_seqs, debug.as_deref_mut())?);
        let item_embs  = self.lookup(TableKind::Item, item_indices, ITEM_INDICES, debug);

        // [batch, k, hidden] x [batch, hidden, 1] → [batch, k]
        Ok(item_embs
            .matmul(final_feat.unsqueeze_dim::<3>(2))
            .squeeze::<2>(2))
    }

    fn encode_pairs(
        &self,
        log_seqs:  &SequenceBatch,
        pos_seqs:  &SequenceBatch,
        neg_seqs:  &SequenceBatch,
        mut debug: Option<&mut DebugSession<B>>,
    ) -> ModelResult<(Tensor<B, 3>, Tensor<B, 3>, Tensor<B, 3>)> {
        let bound = self.item_num + 1;
        for (what, seqs) in [("pos_seqs", pos_seqs), ("neg_seqs", neg_seqs)] {
            seqs.expect_dims(what, log_seqs.dims())?;
            seqs.check_range(TableKind::Item.name(), bound)?;
        }

        let log_feats = self.log2feats(log_seqs, debug.as_deref_mut())?;
        let pos_embs  = self.lookup(TableKind::Item, pos_seqs, POS_SEQS, debug.as_deref_mut());
        let neg_embs  = self.lookup(TableKind::Item, neg_seqs, NEG_SEQS, debug);
        Ok((log_feats, pos_embs, neg_embs))
    }

    fn log2feats(
        &self,
        log_seqs:  &SequenceBatch,
        mut debug: Option<&mut DebugSession<B>>,
    ) -> ModelResult<Tensor<B, 3>> {
        let [batch, seq_len] = log_seqs.dims();
        if seq_len > self.maxlen {
            return Err(ModelError::shape(
                "log_seqs length",
                format!("<= maxlen ({})", self.maxlen),
                seq_len,
            ));
        }
        log_seqs.check_range(TableKind::Item.name(), self.item_num + 1)?;

        let device = self.device();

        let seqs = self
            .lookup(TableKind::Item, log_seqs, LOG_SEQS, debug.as_deref_mut())
            .mul_scalar((self.hidden_units as f64).sqrt());
        let positions = log_seqs.positions();
        let seqs = seqs + self.lookup(TableKind::Position, &positions, POSITIONS, debug);
        let seqs = self.emb_dropout.forward(seqs);

        let keep = Tensor::<B, 2>::from_data(
            TensorData::new(TimelineMask::from_batch(log_seqs).keep_factors(), [batch, seq_len]),
            &device,
        )
        .unsqueeze_dim::<3>(2)
        .repeat_dim(2, self.hidden_units);
        let mut seqs = seqs * keep.clone();

        let mask = causal_mask::<B>(batch, seq_len, &device);
        for block in &self.blocks {
            seqs = block.forward(seqs, mask.clone(), keep.clone());
        }

        Ok(self.last_layernorm.forward(seqs))
    }

    /// Gather from one table, tracing through `debug` for indexed tables.
    fn lookup(
        &self,
        table:     TableKind,
        ids:       &SequenceBatch,
        call_site: CallSite,
        debug:     Option<&mut DebugSession<B>>,
    ) -> Tensor<B, 3> {
        let store = match table {
            TableKind::Item     => &self.item_emb,
            TableKind::Position => &self.pos_emb,
        };
        let index = Tensor::<B, 2, Int>::from_data(
            TensorData::new(ids.ids().to_vec(), ids.dims()),
            &store.device(),
        );
        let out = store.lookup(index);

        match debug {
            Some(session) if store.repr() == EmbeddingRepr::IndexedTable => {
                session.observe(call_site, table, ids, store.weight(), out)
            }
            _ => out,
        }
    }

    fn check_users(&self, user_ids: &[i64], log_seqs: &SequenceBatch) -> ModelResult<()> {
        if user_ids.len() != log_seqs.batch_size() {
            return Err(ModelError::shape("user_ids length", log_seqs.batch_size(), user_ids.len()));
        }
        Ok(())
    }
}

/// [batch, seq, hidden] → [batch, hidden] at position seq - 1.
fn last_position<B: Backend>(feats: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, seq, hidden] = feats.dims();
    feats
        .slice([0..batch, seq - 1..seq, 0..hidden])
        .reshape([batch, hidden])
}

/// Row-wise dot product over the hidden axis → [batch, seq].
fn dot_last<B: Backend>(a: Tensor<B, 3>, b: Tensor<B, 3>) -> Tensor<B, 2> {
    (a * b).sum_dim(2).squeeze::<2>(2)
}
