use std::cell::Cell;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

thread_local! {
    static READS_HELD: Cell<usize> = const { Cell::new(0) };
}

/// Barrier between background publication and the snapshot stage.
///
/// Generation and loading publish chunks under a read guard; the scheduler
/// takes the write guard for the snapshot copy, so no publication straddles
/// a snapshot. Writers are queued fairly: once the scheduler waits, new
/// readers wait behind it, except a thread that already holds a read guard.
#[derive(Default)]
pub struct SnapshotLock {
    lock: RwLock<()>,
}

pub struct SnapshotReadGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

impl SnapshotLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> SnapshotReadGuard<'_> {
        let guard = if Self::held_by_current_thread() {
            self.lock.read_recursive()
        } else {
            self.lock.read()
        };
        READS_HELD.with(|n| n.set(n.get() + 1));
        SnapshotReadGuard { _guard: guard }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }

    /// True while the calling thread holds a read guard on any snapshot lock.
    pub fn held_by_current_thread() -> bool {
        READS_HELD.with(|n| n.get() > 0)
    }
}

impl Drop for SnapshotReadGuard<'_> {
    fn drop(&mut self) {
        READS_HELD.with(|n| n.set(n.get().saturating_sub(1)));
    }
}
