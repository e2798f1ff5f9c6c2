//! Versioned request→response cache.
//!
//! One generation of warm-up resources is "current" at any time; entries from
//! older generations are garbage-collected when a new generation activates.
//! Entries are overwritten on store, never merged: the last writer for a
//! request key wins.

mod store;

pub use store::{CacheStore, StoredResponse};
