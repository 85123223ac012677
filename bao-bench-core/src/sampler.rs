//! Weighted target selection
//!
//! Built once per run from the provisioned instances. Sampling takes `&self`
//! and the caller's RNG, so any number of workers can share one sampler
//! without locking.

use rand::Rng;

use crate::error::SamplerError;

#[derive(Debug, Clone)]
pub struct WeightedSampler<T> {
    items: Vec<T>,
    /// Ascending prefix sums of the weights; the last entry is the total
    cumulative: Vec<u64>,
}

impl<T> WeightedSampler<T> {
    /// Build from `(weight, item)` pairs. Rejects an empty list and zero
    /// weights.
    pub fn new(entries: impl IntoIterator<Item = (u32, T)>) -> Result<Self, SamplerError> {
        let mut items = Vec::new();
        let mut cumulative = Vec::new();
        let mut total: u64 = 0;

        for (index, (weight, item)) in entries.into_iter().enumerate() {
            if weight == 0 {
                return Err(SamplerError::ZeroWeight { index });
            }
            total += u64::from(weight);
            cumulative.push(total);
            items.push(item);
        }

        if items.is_empty() {
            return Err(SamplerError::Empty);
        }

        Ok(Self { items, cumulative })
    }

    /// Pick an item with probability `w_i / Σw`
    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.items[self.next_index(rng)]
    }

    pub fn next_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let draw = rng.random_range(0..self.total_weight());
        // First prefix sum strictly greater than the draw
        self.cumulative.partition_point(|&sum| sum <= draw)
    }

    pub fn total_weight(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// Weight of the item at `index`, `None` when out of range
    pub fn weight(&self, index: usize) -> Option<u64> {
        let upper = *self.cumulative.get(index)?;
        let lower = match index {
            0 => 0,
            i => self.cumulative[i - 1],
        };
        Some(upper - lower)
    }

    /// Selection probability of the item at `index`
    pub fn probability(&self, index: usize) -> Option<f64> {
        self.weight(index)
            .map(|weight| weight as f64 / self.total_weight() as f64)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
