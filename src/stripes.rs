use crate::{Error, Result, Router, StripeLock};
use foldhash::fast::RandomState;
use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// What to do with the slot of a key after a `compute` body has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<V> {
    /// Leave the slot as the body left it (absent stays absent).
    Keep,
    /// Store the given value, inserting the key if it was absent.
    Replace(V),
    /// Remove the key if present.
    Remove,
}

pub(crate) type StripeTable<K, V> = HashMap<K, V, RandomState>;

/// One independently locked partition of the key space.
///
/// The table is only reachable through [`Stripe::with`], whose body cannot
/// return anything borrowed from it.
#[derive(Debug)]
pub(crate) struct Stripe<K, V> {
    table: StripeLock<StripeTable<K, V>>,
}

impl<K, V> Stripe<K, V>
where
    K: Eq + Hash,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: StripeLock::new(HashMap::with_capacity_and_hasher(
                capacity,
                RandomState::default(),
            )),
        }
    }

    /// Runs `func` with the stripe locked. The lock is released when `func`
    /// returns or unwinds.
    #[inline]
    pub fn with<F, R>(&self, func: F) -> R
    where
        F: FnOnce(&mut StripeTable<K, V>) -> R,
    {
        let mut table = self.table.lock();
        func(&mut table)
    }

    /// Read-modify-write of a single key under one lock acquisition.
    ///
    /// A replaced or removed value is dropped after the lock is released.
    pub fn update<F, R>(&self, key: K, func: F) -> R
    where
        F: FnOnce(Option<&mut V>) -> (Action<V>, R),
    {
        let (ret, _evicted) = self.with(|table| match table.entry(key) {
            Entry::Occupied(mut entry) => {
                let (action, ret) = func(Some(entry.get_mut()));
                let evicted = match action {
                    Action::Keep => None,
                    Action::Replace(value) => Some(std::mem::replace(entry.get_mut(), value)),
                    Action::Remove => Some(entry.remove()),
                };
                (ret, evicted)
            }
            Entry::Vacant(entry) => {
                let (action, ret) = func(None);
                if let Action::Replace(value) = action {
                    entry.insert(value);
                }
                (ret, None)
            }
        });
        ret
    }

    pub fn len(&self) -> usize {
        self.with(|table| table.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|table| table.is_empty())
    }

    /// Empties the stripe. Entries are dropped after the lock is released.
    pub fn clear(&self, keep_capacity: bool) {
        if keep_capacity {
            let drained: Vec<(K, V)> = self.with(|table| table.drain().collect());
            drop(drained);
        } else {
            let old = self.with(|table| {
                std::mem::replace(table, HashMap::with_hasher(RandomState::default()))
            });
            drop(old);
        }
    }
}

/// The fixed array of stripes plus the router that picks one per key.
///
/// Aggregate operations walk the stripes in ascending index order holding at
/// most one stripe lock at a time. Together with point operations never
/// holding more than one lock, that ordering rules out lock cycles.
#[derive(Debug)]
pub(crate) struct Stripes<K, V, S> {
    stripes: Box<[Stripe<K, V>]>,
    router: Router<S>,
}

impl<K, V, S> Stripes<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Allocates `stripe_count` empty stripes, splitting `capacity` evenly and
    /// rounding up so the total is at least `capacity`.
    pub fn with_capacity_and_hasher(capacity: usize, stripe_count: usize, hasher: S) -> Result<Self> {
        if stripe_count == 0 {
            log::warn!("refusing to build a stripe map with {stripe_count} stripes");
            return Err(Error::InvalidStripeCount { stripe_count });
        }
        let stripe_capacity = capacity.div_ceil(stripe_count);
        log::debug!(
            "allocating {stripe_count} stripes with capacity {stripe_capacity} each"
        );
        Ok(Self {
            stripes: (0..stripe_count)
                .map(|_| Stripe::with_capacity(stripe_capacity))
                .collect(),
            router: Router::new(hasher, stripe_count),
        })
    }

    #[inline(always)]
    pub fn stripe<Q>(&self, key: &Q) -> &Stripe<K, V>
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        &self.stripes[self.router.route(key)]
    }

    #[inline]
    pub fn router(&self) -> &Router<S> {
        &self.router
    }

    pub fn len(&self) -> usize {
        self.stripes.iter().map(Stripe::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stripes.iter().all(Stripe::is_empty)
    }

    pub fn lens(&self) -> Vec<usize> {
        self.stripes.iter().map(Stripe::len).collect()
    }

    pub fn clear(&self, keep_capacity: bool) {
        for stripe in self.stripes.iter() {
            stripe.clear(keep_capacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;
    use foldhash::fast::FixedState;

    fn stripes<K: Eq + Hash, V>(capacity: usize, stripe_count: usize) -> Stripes<K, V, FixedState> {
        Stripes::with_capacity_and_hasher(capacity, stripe_count, FixedState::default()).unwrap()
    }

    #[test]
    fn test_stripes_update() {
        let stripes = stripes::<u32, u32>(256, 16);
        assert!(stripes.is_empty());
        assert_eq!(stripes.len(), 0);
        stripes.stripe(&1).update(1, |v| {
            assert_eq!(v, None);
            (Action::Replace(1), ())
        });
        assert!(!stripes.is_empty());
        assert_eq!(stripes.len(), 1);
        stripes.stripe(&2).update(2, |v| {
            assert_eq!(v, None);
            (Action::Keep, ())
        });
        stripes.stripe(&3).update(3, |v| {
            assert_eq!(v, None);
            (Action::Remove, ())
        });
        assert_eq!(stripes.len(), 1);
        stripes.stripe(&1).update(1, |v| {
            assert_eq!(v.cloned(), Some(1));
            (Action::Replace(2), ())
        });
        stripes.stripe(&1).update(1, |v| {
            *v.unwrap() += 1;
            (Action::Keep, ())
        });
        let removed = stripes.stripe(&1).update(1, |v| (Action::Remove, v.cloned()));
        assert_eq!(removed, Some(3));
        assert!(stripes.is_empty());
        assert_eq!(stripes.len(), 0);
    }

    #[test]
    fn test_stripes_route_by_borrowed_key() {
        let stripes = stripes::<String, String>(0, 4);
        stripes
            .stripe("hello")
            .update("hello".to_string(), |_| (Action::Replace("world".to_string()), ()));
        let found = stripes
            .stripe("hello")
            .with(|table| table.get("hello").cloned());
        assert_eq!(found.as_deref(), Some("world"));
        assert_eq!(
            stripes.router().route("hello"),
            stripes.router().route(&"hello".to_string())
        );
    }

    #[test]
    fn test_stripes_zero_count() {
        let err = Stripes::<u32, u32, _>::with_capacity_and_hasher(16, 0, FixedState::default())
            .err();
        assert_eq!(err, Some(Error::InvalidStripeCount { stripe_count: 0 }));
    }

    #[test]
    fn test_stripes_capacity_rounds_up() {
        let stripes = stripes::<u32, u32>(10, 16);
        assert!(stripes.stripe(&0).with(|table| table.capacity()) >= 1);
        let stripes = self::stripes::<u32, u32>(100, 3);
        let total = (0..3)
            .map(|i| stripes.stripes[i].with(|table| table.capacity()))
            .sum::<usize>();
        assert!(total >= 100);
    }

    #[test]
    fn test_stripes_lens_and_clear() {
        let stripes = stripes::<u32, u32>(64, 4);
        for i in 0..100 {
            stripes.stripe(&i).update(i, |_| (Action::Replace(i), ()));
        }
        let lens = stripes.lens();
        assert_eq!(lens.len(), 4);
        assert_eq!(lens.iter().sum::<usize>(), 100);

        stripes.clear(true);
        assert!(stripes.is_empty());
        assert!(stripes.stripe(&0).with(|table| table.capacity()) > 0);

        stripes.stripe(&0).update(0, |_| (Action::Replace(0), ()));
        stripes.clear(false);
        assert!(stripes.is_empty());
        assert_eq!(stripes.stripe(&0).with(|table| table.capacity()), 0);
    }

    #[test]
    fn test_stripes_concurrent() {
        let stripes = Arc::new(stripes::<u32, usize>(256, 16));
        let current = Arc::new(AtomicU32::default());
        const N: usize = 1 << 12;
        const M: usize = 8;

        stripes.stripe(&1).update(1, |_| (Action::Replace(0), ()));

        let threads = (0..M)
            .map(|_| {
                let stripes = stripes.clone();
                let current = current.clone();
                std::thread::spawn(move || {
                    for _ in 0..N {
                        stripes.stripe(&1).update(1, |v| {
                            let now = current.fetch_add(1, Ordering::AcqRel);
                            assert_eq!(now, 0);
                            *v.unwrap() += 1;
                            let now = current.fetch_sub(1, Ordering::AcqRel);
                            assert_eq!(now, 1);
                            (Action::Keep, ())
                        });
                    }
                })
            })
            .collect::<Vec<_>>();
        threads.into_iter().for_each(|t| t.join().unwrap());

        assert_eq!(
            stripes.stripe(&1).update(1, |v| (Action::Replace(0), *v.unwrap())),
            N * M
        );
    }
}
