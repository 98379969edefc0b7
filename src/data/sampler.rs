// ============================================================
// Layer 4 — Training Example Sampler
// ============================================================
// Turns user interaction histories into SASRec training batches.
//
// For a history [a, b, c, d] and maxlen 5 one example is:
//
//   log = [0, 0, a, b, c]      items the user saw
//   pos = [0, 0, b, c, d]      the item that came next
//   neg = [0, 0, x, y, z]      random items never in the history
//
// Everything is right-aligned and zero-padded on the left. Longer
// histories keep only their most recent `maxlen` steps.
//
// Users with fewer than two interactions cannot form a pair and are
// skipped. All randomness comes from a seeded StdRng.

use std::collections::HashSet;

use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::sequence::{SequenceBatch, PADDING_ID};

/// One right-aligned training example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainExample {
    pub log: Vec<i64>,
    pub pos: Vec<i64>,
    pub neg: Vec<i64>,
}

/// A batch of examples, ready for `SasRec::pair_logits`.
#[derive(Debug, Clone)]
pub struct TrainBatch {
    pub user_ids: Vec<i64>,
    pub log_seqs: SequenceBatch,
    pub pos_seqs: SequenceBatch,
    pub neg_seqs: SequenceBatch,
}

/// A held-out next-item ranking case. `candidates[0]` is the true item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalCase {
    pub user_id:    i64,
    pub log:        Vec<i64>,
    pub candidates: Vec<i64>,
}

/// Draw an item in `1..=item_num` not in `exclude`.
/// `None` when every item is excluded.
pub fn random_negative<R: Rng>(item_num: usize, exclude: &HashSet<i64>, rng: &mut R) -> Option<i64> {
    let excluded = (1..=item_num as i64).filter(|i| exclude.contains(i)).count();
    if excluded >= item_num {
        return None;
    }
    loop {
        let item = rng.gen_range(1..=item_num as i64);
        if !exclude.contains(&item) {
            return Some(item);
        }
    }
}

/// Build one example from a chronological history (at least two items).
pub fn build_example<R: Rng>(
    history:  &[i64],
    item_num: usize,
    maxlen:   usize,
    rng:      &mut R,
) -> TrainExample {
    let mut log = vec![PADDING_ID; maxlen];
    let mut pos = vec![PADDING_ID; maxlen];
    let mut neg = vec![PADDING_ID; maxlen];

    let seen: HashSet<i64> = history.iter().copied().collect();
    let Some((&last, earlier)) = history.split_last() else {
        return TrainExample { log, pos, neg };
    };

    let mut next = last;
    for (slot, &item) in (0..maxlen).rev().zip(earlier.iter().rev()) {
        log[slot] = item;
        pos[slot] = next;
        if next != PADDING_ID {
            neg[slot] = random_negative(item_num, &seen, rng).unwrap_or(PADDING_ID);
        }
        next = item;
    }

    TrainExample { log, pos, neg }
}

/// Left-pad / truncate `items` to exactly `maxlen`, keeping the most recent.
pub fn right_align(items: &[i64], maxlen: usize) -> Vec<i64> {
    let tail = &items[items.len().saturating_sub(maxlen)..];
    let mut out = vec![PADDING_ID; maxlen - tail.len()];
    out.extend_from_slice(tail);
    out
}

/// Hold out the last item of `history` and rank it against
/// `num_negatives` items the user never interacted with.
pub fn build_eval_case<R: Rng>(
    user_id:       i64,
    history:       &[i64],
    item_num:      usize,
    maxlen:        usize,
    num_negatives: usize,
    rng:           &mut R,
) -> Option<EvalCase> {
    let (&target, earlier) = history.split_last()?;
    if earlier.is_empty() {
        return None;
    }

    let mut exclude: HashSet<i64> = history.iter().copied().collect();
    exclude.insert(PADDING_ID);

    let mut candidates = Vec::with_capacity(num_negatives + 1);
    candidates.push(target);
    for _ in 0..num_negatives {
        candidates.push(random_negative(item_num, &exclude, rng)?);
    }

    Some(EvalCase {
        user_id,
        log: right_align(earlier, maxlen),
        candidates,
    })
}

/// Histories where each user walks through consecutive item ids from a
/// random start, wrapping at `item_num`. Easy to learn, handy for smoke runs.
pub fn synthetic_histories(
    num_users: usize,
    item_num:  usize,
    min_len:   usize,
    max_len:   usize,
    seed:      u64,
) -> Vec<Vec<i64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let min_len = min_len.max(2);
    let max_len = max_len.max(min_len);

    (0..num_users)
        .map(|_| {
            let start = rng.gen_range(0..item_num.max(1));
            let len   = rng.gen_range(min_len..=max_len);
            (0..len)
                .map(|k| ((start + k) % item_num.max(1)) as i64 + 1)
                .collect()
        })
        .collect()
}

/// Random-user batch sampler over a fixed set of histories.
/// User ids are 1-based positions in the history list.
pub struct UserSampler {
    users:    Vec<(i64, Vec<i64>)>,
    item_num: usize,
    maxlen:   usize,
    rng:      StdRng,
}

impl UserSampler {
    pub fn new(histories: Vec<Vec<i64>>, item_num: usize, maxlen: usize, seed: u64) -> Result<Self> {
        let total = histories.len();
        let users: Vec<(i64, Vec<i64>)> = histories
            .into_iter()
            .enumerate()
            .filter(|(_, h)| h.len() > 1)
            .map(|(i, h)| (i as i64 + 1, h))
            .collect();

        if users.is_empty() {
            bail!("no user has at least two interactions ({total} histories)");
        }
        if maxlen == 0 {
            bail!("maxlen must be > 0");
        }

        tracing::debug!("Sampler: {} of {} users usable", users.len(), total);
        Ok(Self {
            users,
            item_num,
            maxlen,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn num_users(&self) -> usize { self.users.len() }

    pub fn next_batch(&mut self, batch_size: usize) -> Result<TrainBatch> {
        let mut user_ids = Vec::with_capacity(batch_size);
        let mut logs     = Vec::with_capacity(batch_size);
        let mut poss     = Vec::with_capacity(batch_size);
        let mut negs     = Vec::with_capacity(batch_size);

        for _ in 0..batch_size.max(1) {
            let (user, history) = &self.users[self.rng.gen_range(0..self.users.len())];
            let ex = build_example(history, self.item_num, self.maxlen, &mut self.rng);
            user_ids.push(*user);
            logs.push(ex.log);
            poss.push(ex.pos);
            negs.push(ex.neg);
        }

        Ok(TrainBatch {
            user_ids,
            log_seqs: SequenceBatch::new(logs)?,
            pos_seqs: SequenceBatch::new(poss)?,
            neg_seqs: SequenceBatch::new(negs)?,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_history_is_right_aligned() {
        let mut rng = StdRng::seed_from_u64(7);
        let ex = build_example(&[3, 7, 12, 20], 50, 6, &mut rng);

        assert_eq!(ex.log, vec![0, 0, 0, 3, 7, 12]);
        assert_eq!(ex.pos, vec![0, 0, 0, 7, 12, 20]);
        assert_eq!(&ex.neg[..3], &[0, 0, 0]);
        for &n in &ex.neg[3..] {
            assert!((1..=50).contains(&n));
            assert!(![3, 7, 12, 20].contains(&n));
        }
    }

    #[test]
    fn test_long_history_keeps_most_recent() {
        let mut rng = StdRng::seed_from_u64(7);
        let history: Vec<i64> = (1..=10).collect();
        let ex = build_example(&history, 20, 4, &mut rng);
        assert_eq!(ex.log, vec![6, 7, 8, 9]);
        assert_eq!(ex.pos, vec![7, 8, 9, 10]);
        assert!(ex.neg.iter().all(|n| *n > 10));
    }

    #[test]
    fn test_random_negative_exhausted() {
        let mut rng = StdRng::seed_from_u64(1);
        let all: HashSet<i64> = (1..=3).collect();
        assert_eq!(random_negative(3, &all, &mut rng), None);

        let some: HashSet<i64> = [1, 2].into_iter().collect();
        assert_eq!(random_negative(3, &some, &mut rng), Some(3));
    }

    #[test]
    fn test_right_align() {
        assert_eq!(right_align(&[4, 5], 4), vec![0, 0, 4, 5]);
        assert_eq!(right_align(&[1, 2, 3, 4, 5], 3), vec![3, 4, 5]);
    }

    #[test]
    fn test_eval_case_holds_out_last_item() {
        let mut rng = StdRng::seed_from_u64(3);
        let case = build_eval_case(9, &[1, 2, 3, 4], 30, 5, 10, &mut rng).unwrap();
        assert_eq!(case.user_id, 9);
        assert_eq!(case.log, vec![0, 0, 1, 2, 3]);
        assert_eq!(case.candidates.len(), 11);
        assert_eq!(case.candidates[0], 4);
        assert!(case.candidates[1..].iter().all(|c| *c > 4));

        assert!(build_eval_case(1, &[5], 30, 5, 10, &mut rng).is_none());
    }

    #[test]
    fn test_synthetic_histories_are_seeded_and_valid() {
        let a = synthetic_histories(8, 20, 3, 6, 42);
        let b = synthetic_histories(8, 20, 3, 6, 42);
        assert_eq!(a, b);
        for h in &a {
            assert!((3..=6).contains(&h.len()));
            assert!(h.iter().all(|i| (1..=20).contains(i)));
            for w in h.windows(2) {
                assert_eq!(w[1], w[0] % 20 + 1);
            }
        }
    }

    #[test]
    fn test_sampler_batches() {
        let histories = vec![vec![1, 2, 3], vec![4], vec![5, 6, 7, 8]];
        let mut sampler = UserSampler::new(histories, 10, 5, 0).unwrap();
        assert_eq!(sampler.num_users(), 2);

        let batch = sampler.next_batch(4).unwrap();
        assert_eq!(batch.log_seqs.dims(), [4, 5]);
        assert_eq!(batch.pos_seqs.dims(), [4, 5]);
        assert_eq!(batch.neg_seqs.dims(), [4, 5]);
        // User 2 has a single interaction and is never drawn
        assert!(batch.user_ids.iter().all(|u| *u == 1 || *u == 3));
    }

    #[test]
    fn test_sampler_needs_a_usable_user() {
        assert!(UserSampler::new(vec![vec![1], vec![]], 10, 5, 0).is_err());
    }
}
