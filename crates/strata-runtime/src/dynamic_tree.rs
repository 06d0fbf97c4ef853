use std::collections::BTreeMap;

use hashbrown::HashMap;
use strata_chunk::{DynamicUpdate, DynamicUpdateTree};

/// Pending block updates ordered by due time, with a position index so a
/// block change can cancel everything queued at that spot.
#[derive(Debug, Default)]
pub struct TimedUpdates {
    by_time: BTreeMap<(u64, u64), DynamicUpdate>,
    by_pos: HashMap<(i32, i32, i32), Vec<(u64, u64)>>,
    next_handle: u64,
}

impl TimedUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest due time, if anything is queued.
    pub fn next_due(&self) -> Option<u64> {
        self.by_time.keys().next().map(|(t, _)| *t)
    }

    fn unlink(&mut self, key: (u64, u64), pos: (i32, i32, i32)) {
        if let Some(keys) = self.by_pos.get_mut(&pos) {
            keys.retain(|k| *k != key);
            if keys.is_empty() {
                self.by_pos.remove(&pos);
            }
        }
    }
}

impl DynamicUpdateTree for TimedUpdates {
    fn queue(&mut self, x: i32, y: i32, z: i32, time: u64, data: u32) -> u64 {
        self.next_handle += 1;
        let handle = self.next_handle;
        let key = (time, handle);
        self.by_time.insert(
            key,
            DynamicUpdate {
                handle,
                x,
                y,
                z,
                time,
                data,
            },
        );
        self.by_pos.entry((x, y, z)).or_default().push(key);
        handle
    }

    fn reset(&mut self, x: i32, y: i32, z: i32) -> usize {
        let Some(keys) = self.by_pos.remove(&(x, y, z)) else {
            return 0;
        };
        keys.iter()
            .filter(|k| self.by_time.remove(k).is_some())
            .count()
    }

    fn drain_due(&mut self, now: u64) -> Vec<DynamicUpdate> {
        let later = match now.checked_add(1) {
            Some(t) => self.by_time.split_off(&(t, 0)),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.by_time, later);
        let out: Vec<DynamicUpdate> = due.into_values().collect();
        for u in &out {
            self.unlink((u.time, u.handle), (u.x, u.y, u.z));
        }
        out
    }

    fn len(&self) -> usize {
        self.by_time.len()
    }
}
