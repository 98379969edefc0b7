// ============================================================
// Layer 2 — CheckUseCase
// ============================================================
// A self-contained smoke run of the whole model:
//
//   Step 1: Validate the model config          (Layer 5 - ml)
//   Step 2: Generate synthetic histories       (Layer 4 - data)
//   Step 3: Hold out each user's last item     (Layer 4 - data)
//   Step 4: Save the effective config          (Layer 6 - infra)
//   Step 5: Train a few Adam steps             (Layer 5 - ml)
//   Step 6: Log per-step metrics to CSV        (Layer 6 - infra)
//   Step 7: Rank held-out items (HR / NDCG)    (Layer 5 - ml)
//   Step 8: Optionally trace a predict call    (Layer 5 - ml)
//
// The device selector picks the Burn backend:
//   cpu  → Autodiff<NdArray>
//   wgpu → Autodiff<Wgpu>

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::sampler::{build_eval_case, synthetic_histories, EvalCase, UserSampler};
use crate::domain::{options::EmbeddingRepr, sequence::SequenceBatch};
use crate::infra::{config_store::ConfigStore, metrics::MetricsLogger};
use crate::ml::{
    debug::{DebugSession, VerifyPolicy, DEFAULT_CAPACITY},
    evaluator::{evaluate, RankingMetrics},
    model::SasRecConfig,
    trainer::{train_steps, TrainOptions},
};

type CpuBackend = Autodiff<NdArray<f32>>;
type GpuBackend = Autodiff<Wgpu>;

/// Cut-off for HR@k / NDCG@k.
pub const EVAL_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Wgpu,
}

// ─── Run Configuration ───────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub user_num:       usize,
    pub item_num:       usize,
    pub hidden_units:   usize,
    pub maxlen:         usize,
    pub num_blocks:     usize,
    pub num_heads:      usize,
    pub dropout_rate:   f64,
    pub embedding:      EmbeddingRepr,
    pub device:         DeviceKind,
    pub batch_size:     usize,
    pub steps:          usize,
    pub lr:             f64,
    pub seed:           u64,
    pub eval_negatives: usize,
    pub debug:          bool,
    pub output_dir:     String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            user_num:       64,
            item_num:       200,
            hidden_units:   32,
            maxlen:         20,
            num_blocks:     2,
            num_heads:      1,
            dropout_rate:   0.2,
            embedding:      EmbeddingRepr::IndexedTable,
            device:         DeviceKind::Cpu,
            batch_size:     16,
            steps:          20,
            lr:             1e-3,
            seed:           42,
            eval_negatives: 100,
            debug:          false,
            output_dir:     "runs".to_string(),
        }
    }
}

impl RunConfig {
    pub fn to_model_config(&self) -> SasRecConfig {
        SasRecConfig::new(self.user_num, self.item_num)
            .with_hidden_units(self.hidden_units)
            .with_maxlen(self.maxlen)
            .with_num_blocks(self.num_blocks)
            .with_num_heads(self.num_heads)
            .with_dropout_rate(self.dropout_rate)
            .with_embedding(self.embedding)
    }
}

/// What a check run found.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub device:          DeviceKind,
    pub steps:           usize,
    pub first_loss:      f64,
    pub final_loss:      f64,
    pub ranking:         RankingMetrics,
    /// Lookup records with gradients captured during training
    pub captured_grads:  usize,
    /// Lookups traced by the debug sessions (training + predict)
    pub traced_lookups:  usize,
    pub mismatches:      usize,
}

// ─── CheckUseCase ─────────────────────────────────────────────────────────────
pub struct CheckUseCase {
    config: RunConfig,
}

impl CheckUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn execute(&self) -> Result<CheckReport> {
        let cfg = &self.config;

        // ── Step 1: Fail fast on an inconsistent model config ────────────────
        cfg.to_model_config().validate()?;

        // ── Step 2-3: Synthetic data, last item held out per user ────────────
        let histories = synthetic_histories(
            cfg.user_num, cfg.item_num, 3, cfg.maxlen * 2, cfg.seed,
        );
        let (train, cases) = split_holdout(&histories, cfg);
        tracing::info!(
            "Generated {} users, {} eval cases",
            histories.len(),
            cases.len()
        );

        // ── Step 4: Record the effective config next to the metrics ──────────
        ConfigStore::in_dir(&cfg.output_dir).save(cfg)?;

        // ── Step 5-8: Backend-specific part ──────────────────────────────────
        match cfg.device {
            DeviceKind::Cpu => {
                tracing::info!("Using NdArray (CPU) backend");
                run_on::<CpuBackend>(cfg, train, &cases, NdArrayDevice::Cpu)
            }
            DeviceKind::Wgpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                run_on::<GpuBackend>(cfg, train, &cases, device)
            }
        }
    }
}

/// Training histories (last item dropped) plus one eval case per user.
fn split_holdout(histories: &[Vec<i64>], cfg: &RunConfig) -> (Vec<Vec<i64>>, Vec<EvalCase>) {
    let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(1));

    let cases = histories
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            build_eval_case(i as i64 + 1, h, cfg.item_num, cfg.maxlen, cfg.eval_negatives, &mut rng)
        })
        .collect();

    let train = histories
        .iter()
        .map(|h| h[..h.len().saturating_sub(1)].to_vec())
        .collect();

    (train, cases)
}

fn run_on<B: AutodiffBackend>(
    cfg:    &RunConfig,
    train:  Vec<Vec<i64>>,
    cases:  &[EvalCase],
    device: B::Device,
) -> Result<CheckReport> {
    let model = cfg.to_model_config().init::<B>(&device)?;
    tracing::info!(
        "Model ready: {} blocks, hidden={}, {:?}",
        model.num_blocks(),
        model.hidden_units(),
        model.repr()
    );

    let mut sampler = UserSampler::new(train, cfg.item_num, cfg.maxlen, cfg.seed)?;
    let mut session = cfg.debug.then(|| DebugSession::<B>::new(DEFAULT_CAPACITY));

    // ── Training ─────────────────────────────────────────────────────────────
    let opts = TrainOptions {
        steps:      cfg.steps,
        batch_size: cfg.batch_size,
        lr:         cfg.lr,
    };
    let (model, history) = train_steps(model, &mut sampler, &opts, session.as_mut())?;

    let logger = MetricsLogger::new(&cfg.output_dir)?;
    logger.log_all(&history)?;
    tracing::info!("Metrics written to '{}'", logger.csv_path().display());

    // ── Evaluation (inner backend, dropout off) ──────────────────────────────
    let valid   = model.valid();
    let ranking = evaluate(&valid, cases, EVAL_K)?;

    let mut traced_lookups = session.as_ref().map_or(0, |s| s.len() + s.evicted());
    let mut mismatches     = session.as_ref().map_or(0, |s| s.mismatches());

    // ── Traced predict on the first eval case ────────────────────────────────
    if let (true, Some(case)) = (cfg.debug, cases.first()) {
        let mut predict_session =
            DebugSession::<B::InnerBackend>::new(DEFAULT_CAPACITY).with_policy(VerifyPolicy::EveryCall);
        let logs       = SequenceBatch::new(vec![case.log.clone()])?;
        let candidates = SequenceBatch::new(vec![case.candidates.clone()])?;
        valid.predict(&[case.user_id], &logs, &candidates, Some(&mut predict_session))?;

        traced_lookups += predict_session.len();
        mismatches     += predict_session.mismatches();
    }

    Ok(CheckReport {
        device:         cfg.device,
        steps:          history.len(),
        first_loss:     history.first().map_or(f64::NAN, |m| m.loss),
        final_loss:     history.last().map_or(f64::NAN, |m| m.loss),
        ranking,
        captured_grads: history.iter().map(|m| m.captured_grads).sum(),
        traced_lookups,
        mismatches,
    })
}
