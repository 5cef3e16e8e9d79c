use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform sample of at most `k` items over a stream of unknown length (Algorithm R).
///
/// Once `n >= k` items have been added, each of them is in the sample with probability `k/n`.
/// The sample never holds fewer than `min(items_seen, k)` items.
#[derive(Debug)]
pub struct Reservoir<T> {
    sample: Vec<T>,
    items_seen: u64,
    k: usize,
    rng: StdRng,
}

impl<T> Reservoir<T> {
    /// Seeded from OS entropy.
    pub fn new(k: usize) -> Self {
        Self::with_rng(k, StdRng::from_os_rng())
    }

    /// Same seed, same stream, same sample.
    pub fn with_seed(k: usize, seed: u64) -> Self {
        Self::with_rng(k, StdRng::seed_from_u64(seed))
    }

    fn with_rng(k: usize, rng: StdRng) -> Self {
        Self {
            sample: Vec::with_capacity(k),
            items_seen: 0,
            k,
            rng,
        }
    }

    pub fn add(&mut self, item: T) {
        self.items_seen += 1;
        if self.sample.len() < self.k {
            self.sample.push(item);
            return;
        }
        if self.k == 0 {
            return;
        }

        let j = self.rng.random_range(0..self.items_seen);
        if let Some(slot) = usize::try_from(j).ok().and_then(|j| self.sample.get_mut(j)) {
            *slot = item;
        }
    }

    /// Current contents. Order is not stream order once replacements happened.
    pub fn sample(&self) -> &[T] {
        &self.sample
    }

    pub fn into_sample(self) -> Vec<T> {
        self.sample
    }

    pub fn items_seen(&self) -> u64 {
        self.items_seen
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl<T> Extend<T> for Reservoir<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}
