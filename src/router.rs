use std::hash::{BuildHasher, Hash};

/// Maps keys to stripe indices.
///
/// `index = hash(key) mod stripe_count`. The stripe count is fixed at
/// construction so a key is routed to the same stripe for the router's whole
/// lifetime. No rebalancing is attempted: a skewed hasher gives skewed stripes.
#[derive(Debug, Clone)]
pub struct Router<S> {
    hasher: S,
    stripe_count: usize,
}

impl<S: BuildHasher> Router<S> {
    /// Caller guarantees `stripe_count > 0`.
    pub fn new(hasher: S, stripe_count: usize) -> Self {
        debug_assert!(stripe_count > 0);
        Self {
            hasher,
            stripe_count,
        }
    }

    #[inline(always)]
    pub fn route<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        (self.hasher.hash_one(key) % self.stripe_count as u64) as usize
    }

    #[inline]
    pub fn stripe_count(&self) -> usize {
        self.stripe_count
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}
