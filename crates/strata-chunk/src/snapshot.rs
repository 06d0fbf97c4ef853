use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

/// A field with a live side written during the tick and a published side
/// replaced once per tick.
pub trait Snapshotable: Send + Sync {
    fn copy_snapshot(&self);
}

/// Every snapshot-backed field of one region.
#[derive(Default)]
pub struct SnapshotManager {
    fields: Mutex<Vec<Weak<dyn Snapshotable>>>,
}

impl SnapshotManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, field: Weak<dyn Snapshotable>) {
        self.fields.lock().push(field);
    }

    /// Publishes every live field; fields whose owner is gone are dropped.
    pub fn copy_all(&self) -> usize {
        let mut fields = self.fields.lock();
        fields.retain(|w| match w.upgrade() {
            Some(f) => {
                f.copy_snapshot();
                true
            }
            None => false,
        });
        fields.len()
    }

    pub fn len(&self) -> usize {
        self.fields.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SnapshotableMap<K, V> {
    live: Mutex<HashMap<K, V>>,
    published: RwLock<Arc<HashMap<K, V>>>,
    changed: AtomicBool,
}

impl<K, V> Default for SnapshotableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SnapshotableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            published: RwLock::new(Arc::new(HashMap::new())),
            changed: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, k: K, v: V) -> Option<V> {
        let mut live = self.live.lock();
        self.changed.store(true, Ordering::Release);
        live.insert(k, v)
    }

    pub fn remove(&self, k: &K) -> Option<V> {
        let mut live = self.live.lock();
        let out = live.remove(k);
        if out.is_some() {
            self.changed.store(true, Ordering::Release);
        }
        out
    }

    /// Like `insert`, also returning the live size afterwards.
    pub fn insert_counted(&self, k: K, v: V) -> (Option<V>, usize) {
        let mut live = self.live.lock();
        self.changed.store(true, Ordering::Release);
        let old = live.insert(k, v);
        (old, live.len())
    }

    pub fn remove_counted(&self, k: &K) -> (Option<V>, usize) {
        let mut live = self.live.lock();
        let out = live.remove(k);
        if out.is_some() {
            self.changed.store(true, Ordering::Release);
        }
        (out, live.len())
    }

    pub fn live_len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn live_values(&self) -> Vec<V> {
        self.live.lock().values().cloned().collect()
    }

    pub fn live_entries(&self) -> Vec<(K, V)> {
        self.live
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The published view; stable for as long as the caller holds it.
    pub fn snapshot(&self) -> Arc<HashMap<K, V>> {
        self.published.read().clone()
    }
}

impl<K, V> Snapshotable for SnapshotableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn copy_snapshot(&self) {
        let copy = {
            let live = self.live.lock();
            if !self.changed.swap(false, Ordering::AcqRel) {
                return;
            }
            live.clone()
        };
        *self.published.write() = Arc::new(copy);
    }
}
