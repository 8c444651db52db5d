//! Caching layers
//!
//! [`InMemoryCache`] deduplicates work within a process, [`PersistentCache`]
//! keeps results across restarts on any [`KeyValueStore`].

pub mod memory;
pub mod persistent;
pub mod store;

pub use memory::{InMemoryCache, Slot};
pub use persistent::{CacheEntry, CacheStats, PersistentCache};
pub use store::{FjallStore, KeyValueStore, MemoryStore, StoreError};
