use crate::{Action, StripeMap};
use proptest::prelude::*;
use std::collections::HashMap;

// Drive StripeMap and a std HashMap with the same single-threaded operations;
// with no concurrency the striped map must behave exactly like a plain map.
proptest! {
    #[test]
    fn prop_stripe_map_matches_hash_map(
        stripe_count in 1usize..=8,
        ops in proptest::collection::vec((0u8..=7u8, 0u8..16u8, -50i64..50i64), 1..200),
    ) {
        let map = StripeMap::<u8, i64>::with_stripe_count(stripe_count).unwrap();
        let mut model: HashMap<u8, i64> = HashMap::new();

        for (op, key, value) in ops {
            match op {
                0 => {
                    map.set(key, Some(value));
                    model.insert(key, value);
                }
                1 => {
                    map.set(key, None);
                    model.remove(&key);
                }
                2 => prop_assert_eq!(map.remove(&key), model.remove(&key)),
                3 => prop_assert_eq!(map.update(key, value), model.insert(key, value)),
                4 => {
                    let expected = *model.entry(key).or_insert(value);
                    prop_assert_eq!(map.get_or_set(key, value), expected);
                }
                5 => {
                    let expected = model.get(&key).copied().unwrap_or(0) + value;
                    model.insert(key, expected);
                    prop_assert_eq!(map.increment(key, value), expected);
                }
                6 => {
                    let expected = model.get(&key).copied().unwrap_or(value);
                    prop_assert_eq!(map.get_with_default(&key, || value), expected);
                }
                7 => {
                    // Drop non-positive values, keep the rest.
                    let removed = map.compute(key, |v| match v {
                        Some(v) if *v <= 0 => (Action::Remove, true),
                        _ => (Action::Keep, false),
                    });
                    let expected = matches!(model.get(&key), Some(v) if *v <= 0);
                    if expected {
                        model.remove(&key);
                    }
                    prop_assert_eq!(removed, expected);
                }
                _ => unreachable!(),
            }

            prop_assert_eq!(map.get(&key), model.get(&key).copied());
        }

        prop_assert_eq!(map.len(), model.len());
        prop_assert_eq!(map.is_empty(), model.is_empty());
        prop_assert_eq!(map.stripe_lens().len(), stripe_count);

        map.remove_all(true);
        prop_assert!(map.is_empty());
        prop_assert_eq!(map.len(), 0);
    }
}
