use crate::{default_stripe_count, Result, StripeMap};
use foldhash::fast::FixedState;
use std::hash::{BuildHasher, Hash};

/// Builder for a [`StripeMap`] with a non-default stripe count, capacity or
/// routing hasher.
///
/// # Examples
/// ```
/// use stripemap::Builder;
///
/// let map = Builder::new()
///     .stripe_count(32)
///     .capacity(1024)
///     .build::<String, u64>()?;
/// assert_eq!(map.stripe_count(), 32);
/// # Ok::<(), stripemap::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Builder<S = FixedState> {
    stripe_count: usize,
    capacity: usize,
    hasher: S,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Starts from the default stripe count, no preallocated capacity and the
    /// default fixed-seed routing hasher.
    pub fn new() -> Self {
        Self {
            stripe_count: default_stripe_count(),
            capacity: 0,
            hasher: FixedState::default(),
        }
    }
}

impl<S> Builder<S> {
    /// Sets the number of stripes. Validated by [`Builder::build`].
    pub fn stripe_count(mut self, stripe_count: usize) -> Self {
        self.stripe_count = stripe_count;
        self
    }

    /// Sets the total initial capacity, split evenly across the stripes.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Replaces the hasher used to route keys to stripes.
    pub fn hasher<S2>(self, hasher: S2) -> Builder<S2> {
        Builder {
            stripe_count: self.stripe_count,
            capacity: self.capacity,
            hasher,
        }
    }

    /// Builds the map.
    ///
    /// # Errors
    /// [`Error::InvalidStripeCount`](crate::Error::InvalidStripeCount) if the
    /// stripe count is zero.
    pub fn build<K, V>(self) -> Result<StripeMap<K, V, S>>
    where
        K: Eq + Hash,
        S: BuildHasher,
    {
        StripeMap::with_capacity_stripe_count_and_hasher(
            self.capacity,
            self.stripe_count,
            self.hasher,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::hash_map::RandomState as StdRandomState;

    #[test]
    fn test_builder_defaults() {
        let map = Builder::default().build::<u32, u32>().unwrap();
        assert_eq!(map.stripe_count(), default_stripe_count());
        assert!(map.is_empty());
    }

    #[test]
    fn test_builder_custom_hasher() {
        let map = Builder::new()
            .stripe_count(3)
            .capacity(30)
            .hasher(StdRandomState::new())
            .build::<&str, i32>()
            .unwrap();
        assert_eq!(map.stripe_count(), 3);
        map.insert("x", 1);
        assert_eq!(map.get("x"), Some(1));
    }

    #[test]
    fn test_builder_rejects_zero_stripes() {
        let err = Builder::new().stripe_count(0).build::<u32, u32>().unwrap_err();
        assert_eq!(err, Error::InvalidStripeCount { stripe_count: 0 });
    }
}
