//! Copy-on-write subscriber registry

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one subscriber within a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) type Callback<T> = Arc<dyn Fn(Arc<T>) + Send + Sync>;

type Entries<T> = Arc<Vec<(SubscriberId, Callback<T>)>>;

/// Identity to callback mapping
///
/// Mutations swap in a new list under the lock; publishers clone the current
/// `Arc` and iterate it with the lock released, so a subscriber may
/// unsubscribe itself (or others may subscribe) during a publish without
/// disturbing the in-flight delivery.
pub(crate) struct Registry<T> {
    next_id: AtomicU64,
    entries: Mutex<Entries<T>>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self { next_id: AtomicU64::new(1), entries: Mutex::new(Arc::new(Vec::new())) }
    }

    pub(crate) fn insert(&self, callback: Callback<T>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.lock();
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push((id, callback));
        *entries = Arc::new(next);
        id
    }

    /// Returns whether `id` was registered
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let mut entries = self.entries.lock();
        if !entries.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        let next: Vec<_> = entries.iter().filter(|(existing, _)| *existing != id).cloned().collect();
        *entries = Arc::new(next);
        true
    }

    /// Current subscriber list, for iteration without the lock
    pub(crate) fn snapshot(&self) -> Entries<T> {
        Arc::clone(&self.entries.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        *entries = Arc::new(Vec::new());
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback<u32> {
        Arc::new(|_| {})
    }

    #[test]
    fn ids_are_unique_and_removal_is_exact_once() {
        let registry = Registry::new();
        let a = registry.insert(noop());
        let b = registry.insert(noop());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshots_are_unaffected_by_later_mutation() {
        let registry = Registry::new();
        let a = registry.insert(noop());
        let before = registry.snapshot();

        registry.remove(a);
        registry.insert(noop());

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].0, a);
        assert_eq!(registry.snapshot().len(), 1);
        assert_ne!(registry.snapshot()[0].0, a);
    }
}
