//! Thread-safe key/value registry for targeted handlers.
//!
//! [`ConcurrentRegistry`] backs the callback-button handlers and the one-shot
//! "request" handlers (user shared / chat shared). A single reader/writer lock
//! guards the map; every operation holds it for its full duration and never
//! blocks on anything else.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use parking_lot::RwLock;

/// A generic map safe for concurrent access from many tasks.
///
/// [`take_and_remove`](Self::take_and_remove) is atomic: two callers racing on
/// the same key observe the value at most once between them.
pub struct ConcurrentRegistry<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> ConcurrentRegistry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces the value for `key`.
    pub fn add(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    /// Returns a clone of the value for `key` without removing it.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().get(key).cloned()
    }

    /// Atomically reads and deletes the value for `key`.
    pub fn take_and_remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.write().remove(key)
    }

    /// Deletes the value for `key`, if any.
    pub fn remove<Q>(&self, key: &Q)
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.write().remove(key);
    }

    /// Returns `true` if a value is registered for `key`.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().contains_key(key)
    }

    /// Returns the number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> Default for ConcurrentRegistry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ConcurrentRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentRegistry")
            .field("len", &self.entries.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_add_peek_remove() {
        let registry = ConcurrentRegistry::new();
        registry.add("ok".to_string(), 1);
        registry.add("ok".to_string(), 2);

        assert_eq!(registry.peek("ok"), Some(2));
        assert_eq!(registry.peek("ok"), Some(2));
        assert_eq!(registry.len(), 1);

        registry.remove("ok");
        assert!(registry.peek("ok").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_take_and_remove_is_one_shot() {
        let registry = ConcurrentRegistry::new();
        registry.add(42_i64, "handler");

        assert_eq!(registry.take_and_remove(&42), Some("handler"));
        assert_eq!(registry.take_and_remove(&42), None);
        assert!(!registry.contains(&42));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_take_observes_value_once() {
        for _ in 0..50 {
            let registry = Arc::new(ConcurrentRegistry::new());
            registry.add(7_i64, ());
            let taken = Arc::new(AtomicUsize::new(0));

            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let taken = Arc::clone(&taken);
                    tokio::spawn(async move {
                        if registry.take_and_remove(&7).is_some() {
                            taken.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();

            for task in tasks {
                task.await.unwrap();
            }
            assert_eq!(taken.load(Ordering::SeqCst), 1);
        }
    }
}
