use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use millbook_core::MillId;

/// Mill-isolated key/value store abstraction for disposable read models.
pub trait MillStore<K, V>: Send + Sync {
    fn get(&self, mill_id: MillId, key: &K) -> Option<V>;
    fn upsert(&self, mill_id: MillId, key: K, value: V);
    fn remove(&self, mill_id: MillId, key: &K);
    fn list(&self, mill_id: MillId) -> Vec<V>;
    /// Clear all read-model records for a mill (rebuild support).
    fn clear_mill(&self, mill_id: MillId);
}

impl<K, V, S> MillStore<K, V> for Arc<S>
where
    S: MillStore<K, V> + ?Sized,
{
    fn get(&self, mill_id: MillId, key: &K) -> Option<V> {
        (**self).get(mill_id, key)
    }

    fn upsert(&self, mill_id: MillId, key: K, value: V) {
        (**self).upsert(mill_id, key, value)
    }

    fn remove(&self, mill_id: MillId, key: &K) {
        (**self).remove(mill_id, key)
    }

    fn list(&self, mill_id: MillId) -> Vec<V> {
        (**self).list(mill_id)
    }

    fn clear_mill(&self, mill_id: MillId) {
        (**self).clear_mill(mill_id)
    }
}

/// In-memory mill-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryMillStore<K, V> {
    inner: RwLock<HashMap<(MillId, K), V>>,
}

impl<K, V> InMemoryMillStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryMillStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MillStore<K, V> for InMemoryMillStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, mill_id: MillId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(mill_id, key.clone())).cloned()
    }

    fn upsert(&self, mill_id: MillId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((mill_id, key), value);
        }
    }

    fn remove(&self, mill_id: MillId, key: &K) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&(mill_id, key.clone()));
        }
    }

    fn list(&self, mill_id: MillId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((m, _k), v)| if *m == mill_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_mill(&self, mill_id: MillId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(m, _k), _v| *m != mill_id);
        }
    }
}
