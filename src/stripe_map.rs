use crate::{Action, Result, Stripes};
use foldhash::fast::FixedState;
use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::hash::{BuildHasher, Hash};
use std::ops::Add;
use std::sync::OnceLock;

/// A thread-safe hashmap whose keys are partitioned into independently locked
/// stripes.
///
/// Every point operation locks exactly the one stripe its key routes to, runs
/// to completion and unlocks before returning, so operations on the same key
/// are linearizable while operations on different stripes run in parallel.
/// Aggregate operations ([`len`](Self::len), [`is_empty`](Self::is_empty),
/// [`remove_all`](Self::remove_all)) visit the stripes one at a time in
/// ascending order and are not point-in-time snapshots.
///
/// Values are copied out of the map; no reference into a stripe outlives its
/// lock.
pub struct StripeMap<K, V, S = FixedState> {
    stripes: Stripes<K, V, S>,
}

/// Returns the default number of stripes: four per available CPU, rounded up
/// to a power of two. Computed once per process.
pub fn default_stripe_count() -> usize {
    static DEFAULT_STRIPE_COUNT: OnceLock<usize> = OnceLock::new();
    *DEFAULT_STRIPE_COUNT.get_or_init(|| {
        (std::thread::available_parallelism().map_or(1, usize::from) * 4).next_power_of_two()
    })
}

impl<K: Eq + Hash, V> Default for StripeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> StripeMap<K, V> {
    /// Creates an empty `StripeMap` with the default number of stripes.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty `StripeMap` with the default number of stripes and
    /// room for at least `capacity` entries in total.
    pub fn with_capacity(capacity: usize) -> Self {
        let stripes = match Stripes::with_capacity_and_hasher(
            capacity,
            default_stripe_count(),
            FixedState::default(),
        ) {
            Ok(stripes) => stripes,
            Err(_) => unreachable!("default stripe count is never zero"),
        };
        Self { stripes }
    }

    /// Creates an empty `StripeMap` with exactly `stripe_count` stripes.
    ///
    /// # Errors
    /// [`Error::InvalidStripeCount`](crate::Error::InvalidStripeCount) if
    /// `stripe_count` is zero.
    ///
    /// # Examples
    /// ```
    /// use stripemap::{Error, StripeMap};
    ///
    /// let map = StripeMap::<String, i64>::with_stripe_count(8)?;
    /// assert_eq!(map.stripe_count(), 8);
    ///
    /// assert!(matches!(
    ///     StripeMap::<String, i64>::with_stripe_count(0),
    ///     Err(Error::InvalidStripeCount { stripe_count: 0 })
    /// ));
    /// # Ok::<(), Error>(())
    /// ```
    pub fn with_stripe_count(stripe_count: usize) -> Result<Self> {
        Self::with_capacity_and_stripe_count(0, stripe_count)
    }

    /// Creates an empty `StripeMap` with `stripe_count` stripes and room for
    /// at least `capacity` entries in total, split evenly across stripes.
    pub fn with_capacity_and_stripe_count(capacity: usize, stripe_count: usize) -> Result<Self> {
        Self::with_capacity_stripe_count_and_hasher(capacity, stripe_count, FixedState::default())
    }

    /// Builds a map with `stripe_count` stripes from key-value pairs.
    ///
    /// Pairs are stored with ordinary [`insert`](Self::insert) calls in
    /// sequence, so a duplicate key keeps its last value.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::from_pairs(4, [("a", 1), ("b", 2), ("a", 3)])?;
    /// assert_eq!(map.len(), 2);
    /// assert_eq!(map.get("a"), Some(3));
    /// # Ok::<(), stripemap::Error>(())
    /// ```
    pub fn from_pairs<I>(stripe_count: usize, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let map = Self::with_stripe_count(stripe_count)?;
        for (key, value) in pairs {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K, V, S> StripeMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Creates an empty `StripeMap` that routes keys with `hasher`.
    pub fn with_stripe_count_and_hasher(stripe_count: usize, hasher: S) -> Result<Self> {
        Self::with_capacity_stripe_count_and_hasher(0, stripe_count, hasher)
    }

    /// The most general constructor; see also [`Builder`](crate::Builder).
    pub fn with_capacity_stripe_count_and_hasher(
        capacity: usize,
        stripe_count: usize,
        hasher: S,
    ) -> Result<Self> {
        Ok(Self {
            stripes: Stripes::with_capacity_and_hasher(capacity, stripe_count, hasher)?,
        })
    }

    /// The number of stripes, fixed at construction.
    pub fn stripe_count(&self) -> usize {
        self.stripes.router().stripe_count()
    }

    /// The hasher used to route keys to stripes.
    pub fn hasher(&self) -> &S {
        self.stripes.router().hasher()
    }

    /// The stripe `key` is stored in. Stable for the lifetime of the map.
    pub fn stripe_index<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        self.stripes.router().route(key)
    }

    /// Gets a copy of the value associated with `key`.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::<String, u32>::new();
    /// map.insert("key".to_string(), 42);
    /// assert_eq!(map.get("key"), Some(42));
    /// assert_eq!(map.get("missing"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.inspect(key, |value| value.cloned())
    }

    /// Runs `func` on the value associated with `key` while its stripe is
    /// locked, without cloning the value.
    ///
    /// **Locking behaviour:** calling back into this map from `func` may
    /// deadlock.
    pub fn inspect<Q, F, R>(&self, key: &Q, func: F) -> R
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        F: FnOnce(Option<&V>) -> R,
    {
        self.stripes.stripe(key).with(|table| func(table.get(key)))
    }

    /// Returns `true` if the map holds a value for `key`.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::new();
    /// map.insert("key", 1);
    /// assert!(map.contains_key("key"));
    /// assert!(!map.contains_key("missing"));
    /// ```
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inspect(key, |value| value.is_some())
    }

    /// Gets the value associated with `key`, or `default()` if there is none.
    ///
    /// The default is **not** inserted and is only evaluated when the key is
    /// absent. Writes go through [`set`](Self::set), which always overwrites
    /// and never consults a default.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::<&str, u32>::new();
    /// assert_eq!(map.get_with_default("hits", || 0), 0);
    /// assert_eq!(map.get("hits"), None);
    /// ```
    pub fn get_with_default<Q, F>(&self, key: &Q, default: F) -> V
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
        F: FnOnce() -> V,
    {
        self.get(key).unwrap_or_else(default)
    }

    /// Stores `value` under `key`, or removes `key` when `value` is `None`.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::new();
    /// map.set("key", Some(1));
    /// assert_eq!(map.get("key"), Some(1));
    /// map.set("key", None);
    /// assert_eq!(map.get("key"), None);
    /// ```
    pub fn set(&self, key: K, value: Option<V>) {
        match value {
            Some(value) => self.insert(key, value),
            None => {
                self.remove(&key);
            }
        }
    }

    /// Stores `value` under `key`, overwriting any previous value.
    pub fn insert(&self, key: K, value: V) {
        self.update(key, value);
    }

    /// Stores `value` under `key` and returns the previous value, if any.
    pub fn update(&self, key: K, value: V) -> Option<V> {
        self.stripes.stripe(&key).with(|table| table.insert(key, value))
    }

    /// Removes `key` and returns its value, if any.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::<String, u32>::new();
    /// map.insert("key".to_string(), 42);
    /// assert_eq!(map.remove("key"), Some(42));
    /// assert_eq!(map.remove("key"), None);
    /// ```
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.stripes.stripe(key).with(|table| table.remove(key))
    }

    /// Returns the value stored under `key`, first storing `candidate` if the
    /// key is absent.
    ///
    /// The check and the insert happen under one stripe lock acquisition, so
    /// among racing callers exactly one candidate is ever stored and all of
    /// them get that value back. `candidate` is built by the caller even when
    /// it ends up unused, in which case it is dropped after the stripe is
    /// unlocked; see [`get_or_set_with`](Self::get_or_set_with).
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::new();
    /// assert_eq!(map.get_or_set("key", 1), 1);
    /// assert_eq!(map.get_or_set("key", 2), 1);
    /// ```
    pub fn get_or_set(&self, key: K, candidate: V) -> V
    where
        V: Clone,
    {
        let (value, _unused) = self.stripes.stripe(&key).with(|table| match table.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), Some(candidate)),
            Entry::Vacant(entry) => (entry.insert(candidate).clone(), None),
        });
        value
    }

    /// Like [`get_or_set`](Self::get_or_set), but the candidate is only built
    /// when the key is absent.
    ///
    /// `func` runs while the stripe is locked. If it panics the lock is
    /// released and nothing is inserted.
    ///
    /// **Locking behaviour:** calling back into this map from `func` may
    /// deadlock.
    pub fn get_or_set_with<F>(&self, key: K, func: F) -> V
    where
        V: Clone,
        F: FnOnce() -> V,
    {
        self.stripes
            .stripe(&key)
            .with(|table| table.entry(key).or_insert_with(func).clone())
    }

    /// Fallible form of [`get_or_set_with`](Self::get_or_set_with).
    ///
    /// An error from `func` is returned after the stripe is unlocked and the
    /// key stays absent.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::<&str, u32>::new();
    /// let res = map.try_get_or_set_with("port", || "x".parse::<u32>());
    /// assert!(res.is_err());
    /// assert!(!map.contains_key("port"));
    /// assert_eq!(map.try_get_or_set_with("port", || "80".parse::<u32>()), Ok(80));
    /// ```
    pub fn try_get_or_set_with<F, E>(&self, key: K, func: F) -> Result<V, E>
    where
        V: Clone,
        F: FnOnce() -> Result<V, E>,
    {
        self.stripes.stripe(&key).with(|table| match table.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => Ok(entry.insert(func()?).clone()),
        })
    }

    /// Atomically reads, modifies and writes the slot of `key`.
    ///
    /// `func` sees the current value (if any) and returns the [`Action`] to
    /// apply along with a result for the caller. All of it happens under one
    /// stripe lock acquisition. A value displaced by `Replace` or `Remove` is
    /// dropped after the stripe is unlocked.
    ///
    /// If `func` panics the stripe is released and the returned `Action` is
    /// never applied, but changes `func` already made through the `&mut V`
    /// are not rolled back. Mutate in place only once nothing can fail, or
    /// build the new value and return it with [`Action::Replace`].
    ///
    /// **Locking behaviour:** calling back into this map from `func` may
    /// deadlock.
    ///
    /// # Examples
    /// ```
    /// use stripemap::{Action, StripeMap};
    ///
    /// let map = StripeMap::new();
    /// map.insert("stock", 3u32);
    ///
    /// // Take one item, dropping the key when the last one goes.
    /// let took = map.compute("stock", |stock| match stock {
    ///     Some(&mut 1) => (Action::Remove, true),
    ///     Some(n) => {
    ///         *n -= 1;
    ///         (Action::Keep, true)
    ///     }
    ///     None => (Action::Keep, false),
    /// });
    /// assert!(took);
    /// assert_eq!(map.get("stock"), Some(2));
    /// ```
    pub fn compute<F, R>(&self, key: K, func: F) -> R
    where
        F: FnOnce(Option<&mut V>) -> (Action<V>, R),
    {
        self.stripes.stripe(&key).update(key, func)
    }

    /// Adds `delta` to the value of `key` and returns the new value. An
    /// absent key counts as `V::default()`, the additive zero for numbers.
    ///
    /// # Examples
    /// ```
    /// use stripemap::StripeMap;
    ///
    /// let map = StripeMap::new();
    /// assert_eq!(map.increment("hits", 5), 5);
    /// assert_eq!(map.increment("hits", -2), 3);
    /// ```
    pub fn increment(&self, key: K, delta: V) -> V
    where
        V: Clone + Default + Add<Output = V>,
    {
        self.compute(key, |value| {
            let next = value.map_or_else(V::default, |v| v.clone()) + delta;
            (Action::Replace(next.clone()), next)
        })
    }

    /// The number of entries, summed stripe by stripe.
    ///
    /// Not a snapshot: concurrent writers may change stripes before or after
    /// they are counted.
    pub fn len(&self) -> usize {
        self.stripes.len()
    }

    /// Whether every stripe is empty, checked one stripe at a time.
    pub fn is_empty(&self) -> bool {
        self.stripes.is_empty()
    }

    /// The number of entries in each stripe, in stripe order.
    pub fn stripe_lens(&self) -> Vec<usize> {
        self.stripes.lens()
    }

    /// Removes every entry, one stripe at a time in ascending order.
    ///
    /// With `keep_capacity` each stripe keeps its allocation for reuse.
    /// Concurrent readers may observe some stripes cleared and others not yet.
    pub fn remove_all(&self, keep_capacity: bool) {
        log::trace!(
            "clearing {} stripes, keep_capacity={keep_capacity}",
            self.stripe_count()
        );
        self.stripes.clear(keep_capacity);
    }

    /// Removes every entry and releases the stripes' memory.
    pub fn clear(&self) {
        self.remove_all(false);
    }
}

impl<K, V, S> std::fmt::Debug for StripeMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeMap")
            .field("stripe_count", &self.stripe_count())
            .field("len", &self.len())
            .finish()
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for StripeMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K, V, S> Extend<(K, V)> for StripeMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}
