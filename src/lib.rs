//! A thread-safe hashmap that partitions its keys into independently locked stripes.
//!
//! # Overview
//! `stripemap` provides a concurrent hashmap where every key is routed to one of
//! a fixed number of stripes, each guarded by its own lock. Operations on keys in
//! different stripes run in parallel; operations on the same key are serialized.
//!
//! # Features
//! - Fixed stripe count chosen at construction, never resized
//! - Atomic check-then-act (`get_or_set`) and read-modify-write (`compute`, `increment`)
//! - Non-inserting default reads (`get_with_default`)
//! - Pluggable routing hasher through [`std::hash::BuildHasher`]
//! - No poisoning, a stripe is released normally on panic
//! - Deadlock-free aggregates: `len`, `is_empty` and `remove_all` lock one stripe
//!   at a time in ascending order
//!
//! # Examples
//! ```
//! use stripemap::StripeMap;
//!
//! let map = StripeMap::<String, i64>::with_stripe_count(8)?;
//!
//! // Basic operations
//! map.set("a".into(), Some(1));
//! assert_eq!(map.get("a"), Some(1));
//!
//! // Atomic read-modify-write
//! assert_eq!(map.increment("a".into(), 5), 6);
//!
//! // Remove a value
//! assert_eq!(map.remove("a"), Some(6));
//! assert_eq!(map.get("a"), None);
//! # Ok::<(), stripemap::Error>(())
//! ```
mod config;
mod error;
mod futex;
mod router;
mod stripe_map;
#[cfg(test)]
mod stripe_map_proptest;
mod stripes;

pub use config::Builder;
pub use error::{Error, Result};
pub use stripe_map::*;
pub use stripes::Action;

use futex::*;
use router::*;
use stripes::*;
