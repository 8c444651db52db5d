use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

use crate::models::GeocodeResult;

/// Handle to one city's resolution, shared by every concurrent caller.
pub type Slot = Arc<OnceCell<GeocodeResult>>;

/// Process-lifetime cache of resolved cities.
///
/// Each key maps to a [`Slot`] rather than a plain value: callers that race on
/// an uncached key all await the same cell, so only one of them performs the
/// lookup. No eviction besides [`InMemoryCache::evict_if_same`].
#[derive(Default)]
pub struct InMemoryCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Completed result for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<GeocodeResult> {
        self.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    pub fn put(&self, key: &str, result: GeocodeResult) {
        self.lock()
            .insert(key.to_string(), Arc::new(OnceCell::new_with(Some(result))));
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.lock().get(key).is_some_and(|slot| slot.initialized())
    }

    /// Existing slot for `key`, or a new empty one.
    #[must_use]
    pub fn slot(&self, key: &str) -> Slot {
        self.lock().entry(key.to_string()).or_default().clone()
    }

    /// Install a fresh empty slot, detaching callers of the old one.
    #[must_use]
    pub fn replace_slot(&self, key: &str) -> Slot {
        let slot = Slot::default();
        self.lock().insert(key.to_string(), slot.clone());
        slot
    }

    /// Drop `slot` unless another one has replaced it meanwhile.
    pub fn evict_if_same(&self, key: &str, slot: &Slot) {
        let mut slots = self.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
