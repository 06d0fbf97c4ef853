use std::collections::VecDeque;
use std::hash::Hash;

use hashbrown::HashSet;
use parking_lot::Mutex;

/// FIFO that ignores pushes of an element already queued.
pub struct SetQueue<T> {
    inner: Mutex<(VecDeque<T>, HashSet<T>)>,
}

impl<T: Copy + Eq + Hash> Default for SetQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq + Hash> SetQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new((VecDeque::new(), HashSet::new())),
        }
    }

    /// Returns false if `item` was already queued.
    pub fn push(&self, item: T) -> bool {
        let mut g = self.inner.lock();
        if !g.1.insert(item) {
            return false;
        }
        g.0.push_back(item);
        true
    }

    /// Removes up to `max` items in queue order.
    pub fn drain(&self, max: usize) -> Vec<T> {
        let mut g = self.inner.lock();
        let n = max.min(g.0.len());
        let out: Vec<T> = g.0.drain(..n).collect();
        for item in &out {
            g.1.remove(item);
        }
        out
    }

    pub fn drain_all(&self) -> Vec<T> {
        self.drain(usize::MAX)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.lock().1.contains(item)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().0.is_empty()
    }
}
