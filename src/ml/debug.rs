// ============================================================
// Layer 5 — Embedding Verification Session
// ============================================================
// An explicit, caller-owned record of traced embedding lookups.
// Only the IndexedTable representation is traced.
//
// For every traced lookup the session:
//   1. tracks the distinct batch lengths seen per call-site
//      ("log2feats_log_seqs", "forward_pos_seqs", ...) and logs
//      each new one
//   2. recomputes the lookup on the host CPU (NdArray backend) from
//      a copy of the table and compares bit-exact, NaN == NaN
//      (per VerifyPolicy: first observation or every call)
//   3. adds a zero-valued `require_grad` probe to the lookup output
//      and keeps a handle on the table weights
//
// After `loss.backward()` the caller runs `collect_gradients(&grads)`
// and every record gets the gradient w.r.t. its lookup output (via
// the probe) and w.r.t. the whole table.
//
// Capacity is bounded: the oldest record is dropped when full.
// `reset()` clears everything.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use burn::{
    backend::NdArray,
    prelude::*,
    tensor::{backend::AutodiffBackend, module::embedding},
};

use crate::domain::sequence::SequenceBatch;
use crate::ml::embedding::TableKind;

/// Host CPU backend used for reference recomputation.
pub type ReferenceBackend = NdArray<f32>;

pub const DEFAULT_CAPACITY: usize = 64;

/// Where a lookup happened: `<function>_<variable>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub function: &'static str,
    pub variable: &'static str,
}

impl CallSite {
    pub const fn new(function: &'static str, variable: &'static str) -> Self {
        Self { function, variable }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.function, self.variable)
    }
}

/// When the CPU reference recomputation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyPolicy {
    /// Once per call-site.
    #[default]
    FirstObservation,
    /// On every traced lookup.
    EveryCall,
}

/// Result of comparing a lookup against its CPU reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Match,
    Mismatch {
        /// Elements that differ (or the larger length, on shape disagreement).
        differing:    usize,
        max_abs_diff: f32,
    },
}

impl Verification {
    pub fn is_match(&self) -> bool { matches!(self, Verification::Match) }
}

/// One traced lookup.
#[derive(Debug)]
pub struct LookupRecord<B: Backend> {
    pub call_site:    CallSite,
    pub table:        TableKind,
    pub input_dims:   [usize; 2],
    /// `None` when the policy skipped recomputation for this call.
    pub verification: Option<Verification>,
    /// d loss / d lookup output, filled by `collect_gradients`.
    pub grad_out:     Option<TensorData>,
    /// d loss / d table weights, filled by `collect_gradients`.
    pub grad_weight:  Option<TensorData>,
    probe:            Tensor<B, 3>,
    weight:           Tensor<B, 2>,
}

/// Caller-owned debug state for one model instance.
#[derive(Debug)]
pub struct DebugSession<B: Backend> {
    capacity:      usize,
    policy:        VerifyPolicy,
    observed_lens: HashMap<CallSite, Vec<usize>>,
    verified:      HashSet<CallSite>,
    records:       VecDeque<LookupRecord<B>>,
    mismatches:    usize,
    evicted:       usize,
}

impl<B: Backend> Default for DebugSession<B> {
    fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

impl<B: Backend> DebugSession<B> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity:      capacity.max(1),
            policy:        VerifyPolicy::default(),
            observed_lens: HashMap::new(),
            verified:      HashSet::new(),
            records:       VecDeque::new(),
            mismatches:    0,
            evicted:       0,
        }
    }

    pub fn with_policy(mut self, policy: VerifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// Verification mismatches seen since the last reset.
    pub fn mismatches(&self) -> usize { self.mismatches }

    /// Records dropped because the session was full.
    pub fn evicted(&self) -> usize { self.evicted }

    pub fn records(&self) -> impl Iterator<Item = &LookupRecord<B>> {
        self.records.iter()
    }

    /// Distinct batch lengths seen at `call_site`, in first-seen order.
    pub fn observed_lengths(&self, call_site: CallSite) -> &[usize] {
        self.observed_lens
            .get(&call_site)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reset(&mut self) {
        self.observed_lens.clear();
        self.verified.clear();
        self.records.clear();
        self.mismatches = 0;
        self.evicted    = 0;
    }

    /// Trace one lookup. Returns `out` plus a zero probe: numerically the
    /// same tensor, but with a gradient handle the session can read later.
    pub fn observe(
        &mut self,
        call_site: CallSite,
        table:     TableKind,
        ids:       &SequenceBatch,
        weight:    Tensor<B, 2>,
        out:       Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let len  = ids.batch_size();
        let lens = self.observed_lens.entry(call_site).or_default();
        if !lens.contains(&len) {
            lens.push(len);
            tracing::info!("{} len({}) = {}", call_site.function, call_site.variable, len);
        }

        let first_seen = self.verified.insert(call_site);
        if first_seen {
            tracing::info!(
                "{call_site}: input {:?}, {} table {:?}, output {:?}",
                ids.dims(),
                table.name(),
                weight.dims(),
                out.dims(),
            );
        }

        let verification = match self.policy {
            VerifyPolicy::EveryCall        => Some(verify_on_host(ids, &weight, &out)),
            VerifyPolicy::FirstObservation => first_seen.then(|| verify_on_host(ids, &weight, &out)),
        };
        if let Some(Verification::Mismatch { differing, max_abs_diff }) = &verification {
            self.mismatches += 1;
            tracing::warn!(
                "{call_site}: lookup differs from CPU reference \
                 ({differing} elements, max |diff| = {max_abs_diff})"
            );
        }

        let probe = Tensor::<B, 3>::zeros(out.dims(), &out.device()).require_grad();

        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.evicted += 1;
        }
        self.records.push_back(LookupRecord {
            call_site,
            table,
            input_dims: ids.dims(),
            verification,
            grad_out: None,
            grad_weight: None,
            probe: probe.clone(),
            weight,
        });

        out + probe
    }
}

impl<B: AutodiffBackend> DebugSession<B> {
    /// Copy gradients for every record not yet filled.
    /// Returns how many records received an output gradient.
    pub fn collect_gradients(&mut self, grads: &B::Gradients) -> usize {
        let mut captured = 0;
        for record in self.records.iter_mut().filter(|r| r.grad_out.is_none()) {
            record.grad_out    = record.probe.grad(grads).map(|g| g.into_data());
            record.grad_weight = record.weight.grad(grads).map(|g| g.into_data());
            if record.grad_out.is_some() {
                captured += 1;
            }
        }
        tracing::debug!("captured gradients for {captured} lookups");
        captured
    }
}

/// Recompute `weight[ids]` on the host and compare with `out`.
fn verify_on_host<B: Backend>(
    ids:    &SequenceBatch,
    weight: &Tensor<B, 2>,
    out:    &Tensor<B, 3>,
) -> Verification {
    let device = Default::default();
    let table  = Tensor::<ReferenceBackend, 2>::from_data(weight.to_data(), &device);
    let index  = Tensor::<ReferenceBackend, 2, Int>::from_data(
        TensorData::new(ids.ids().to_vec(), ids.dims()),
        &device,
    );
    let reference = embedding(table, index).into_data();
    compare_exact(&out.to_data(), &reference)
}

/// Zero-tolerance comparison; NaN equals NaN.
pub fn compare_exact(actual: &TensorData, reference: &TensorData) -> Verification {
    let a: Vec<f32> = actual.iter::<f32>().collect();
    let r: Vec<f32> = reference.iter::<f32>().collect();

    if actual.shape != reference.shape || a.len() != r.len() {
        return Verification::Mismatch {
            differing:    a.len().max(r.len()),
            max_abs_diff: f32::INFINITY,
        };
    }

    let mut differing    = 0;
    let mut max_abs_diff = 0.0f32;
    for (x, y) in a.iter().zip(&r) {
        let same = x == y || (x.is_nan() && y.is_nan());
        if !same {
            differing += 1;
            max_abs_diff = max_abs_diff.max((x - y).abs());
        }
    }

    if differing == 0 {
        Verification::Match
    } else {
        Verification::Mismatch { differing, max_abs_diff }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = NdArray<f32>;

    const SITE: CallSite = CallSite::new("log2feats", "log_seqs");

    fn ids() -> SequenceBatch {
        SequenceBatch::new(vec![vec![0, 2, 1], vec![3, 3, 0]]).unwrap()
    }

    fn table(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2> {
        Tensor::random([4, 3], burn::tensor::Distribution::Normal(0.0, 1.0), device)
    }

    fn lookup(weight: &Tensor<TestBackend, 2>, ids: &SequenceBatch) -> Tensor<TestBackend, 3> {
        let device = weight.device();
        let index  = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(ids.ids().to_vec(), ids.dims()),
            &device,
        );
        embedding(weight.clone(), index)
    }

    #[test]
    fn test_call_site_name() {
        assert_eq!(SITE.to_string(), "log2feats_log_seqs");
    }

    #[test]
    fn test_compare_exact_treats_nan_as_equal() {
        let a = TensorData::new(vec![1.0f32, f32::NAN, -0.0], [3]);
        let b = TensorData::new(vec![1.0f32, f32::NAN, 0.0], [3]);
        assert_eq!(compare_exact(&a, &b), Verification::Match);

        let c = TensorData::new(vec![1.0f32, 2.0, 3.5], [3]);
        let d = TensorData::new(vec![1.0f32, 2.0, 3.0], [3]);
        assert_eq!(
            compare_exact(&c, &d),
            Verification::Mismatch { differing: 1, max_abs_diff: 0.5 }
        );

        let e = TensorData::new(vec![1.0f32, 2.0], [2]);
        assert!(!compare_exact(&c, &e).is_match());
    }

    #[test]
    fn test_correct_lookup_never_mismatches() {
        let device  = Default::default();
        let weight  = table(&device);
        let ids     = ids();
        let mut session = DebugSession::<TestBackend>::new(8).with_policy(VerifyPolicy::EveryCall);

        for _ in 0..3 {
            let out    = lookup(&weight, &ids);
            let traced = session.observe(SITE, TableKind::Item, &ids, weight.clone(), out.clone());
            // Tracing never changes values
            assert_eq!(traced.into_data(), out.into_data());
        }
        assert_eq!(session.len(), 3);
        assert_eq!(session.mismatches(), 0);
        assert!(session.records().all(|r| r.verification == Some(Verification::Match)));
    }

    #[test]
    fn test_corrupted_output_is_flagged_not_fatal() {
        let device  = Default::default();
        let weight  = table(&device);
        let ids     = ids();
        let mut session = DebugSession::<TestBackend>::new(8);

        let bad = lookup(&weight, &ids).add_scalar(1.0);
        let _   = session.observe(SITE, TableKind::Item, &ids, weight, bad);
        assert_eq!(session.mismatches(), 1);
        let record = session.records().next().unwrap();
        assert!(matches!(record.verification, Some(Verification::Mismatch { differing: 18, .. })));
    }

    #[test]
    fn test_first_observation_policy_verifies_once_per_site() {
        let device  = Default::default();
        let weight  = table(&device);
        let ids     = ids();
        let other   = CallSite::new("predict", "item_indices");
        let mut session = DebugSession::<TestBackend>::new(8);

        for site in [SITE, SITE, other] {
            let out = lookup(&weight, &ids);
            let _   = session.observe(site, TableKind::Item, &ids, weight.clone(), out);
        }
        let verified: Vec<bool> = session.records().map(|r| r.verification.is_some()).collect();
        assert_eq!(verified, vec![true, false, true]);
    }

    #[test]
    fn test_lengths_are_tracked_per_site() {
        let device  = Default::default();
        let weight  = table(&device);
        let mut session = DebugSession::<TestBackend>::new(8);

        let short = SequenceBatch::new(vec![vec![1, 2, 3]]).unwrap();
        for batch in [ids(), short.clone(), ids(), short] {
            let out = lookup(&weight, &batch);
            let _   = session.observe(SITE, TableKind::Item, &batch, weight.clone(), out);
        }
        assert_eq!(session.observed_lengths(SITE), &[2, 1]);
        assert!(session.observed_lengths(CallSite::new("x", "y")).is_empty());
    }

    #[test]
    fn test_capacity_and_reset() {
        let device  = Default::default();
        let weight  = table(&device);
        let ids     = ids();
        let mut session = DebugSession::<TestBackend>::new(2);

        for _ in 0..5 {
            let out = lookup(&weight, &ids);
            let _   = session.observe(SITE, TableKind::Item, &ids, weight.clone(), out);
        }
        assert_eq!(session.len(), 2);
        assert_eq!(session.evicted(), 3);

        session.reset();
        assert!(session.is_empty());
        assert_eq!(session.evicted(), 0);
        assert!(session.observed_lengths(SITE).is_empty());
    }
}
