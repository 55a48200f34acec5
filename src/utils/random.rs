//! Seedable randomness for feature sampling, greedy bin sampling and
//! bootstrap draws.
//!
//! Every stochastic step in the crate flows through a `ChaCha8Rng` seeded
//! from the trainer's `random_state` so that training is reproducible.
//! Worker threads derive their own sub-seeds deterministically.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// A generator seeded from a trainer's `random_state`.
pub(crate) fn seeded(random_state: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(random_state)
}

/// A generator for one worker thread, derived from `random_state` so that
/// a run with a fixed seed and a fixed thread count is reproducible.
pub(crate) fn seeded_for_worker(random_state: u64, worker_id: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(random_state.wrapping_add(0x9e37_79b9_7f4a_7c15u64.wrapping_mul(worker_id as u64 + 1)))
}

/// Partially shuffles `target` so its first `k` elements are a uniform
/// draw (without replacement) from the first `n`.
///
/// This is the single shared Fisher-Yates primitive; feature sampling and
/// the greedy bin sampler both call it.
pub(crate) fn partial_shuffle<R: Rng>(rng: &mut R, target: &mut [u32], n: usize, k: usize) {
    debug_assert!(k <= n && n <= target.len());
    if n == k {
        return;
    }
    let mut remaining = n;
    for idx in 0..k {
        let next = idx + rng.gen_range(0..remaining);
        target.swap(idx, next);
        remaining -= 1;
    }
}

/// Draws `k` samples with replacement from `0..n` and accumulates them
/// into `histogram`. Used for bootstrap sample weights: entries left at
/// zero are out-of-bag.
pub(crate) fn sample_with_replacement<R: Rng>(rng: &mut R, n: usize, k: usize, histogram: &mut [u32]) {
    debug_assert!(histogram.len() >= n);
    for _ in 0..k {
        histogram[rng.gen_range(0..n)] += 1;
    }
}
