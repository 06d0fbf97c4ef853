use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::light::LightChannel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightOp {
    /// Light at the cell rose; push it outward.
    Greater,
    /// Light at the cell fell; re-check what it used to supply.
    Lesser,
    /// Recompute the cell from its neighbors.
    Refresh,
}

/// Pending light work for one chunk and one channel. Cells are chunk-local
/// linear indices.
#[derive(Debug, Default)]
pub struct LightWork {
    /// Direct value writes, applied before any op.
    pub updates: HashMap<u16, u8>,
    pub ops: HashSet<(u16, LightOp)>,
}

impl LightWork {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len() + self.ops.len()
    }
}

#[derive(Default)]
struct ChannelWork {
    work: Mutex<LightWork>,
    registered: AtomicBool,
}

#[derive(Default)]
pub(crate) struct LightQueues {
    block: ChannelWork,
    sky: ChannelWork,
}

impl LightQueues {
    fn channel(&self, channel: LightChannel) -> &ChannelWork {
        match channel {
            LightChannel::Block => &self.block,
            LightChannel::Sky => &self.sky,
        }
    }

    pub(crate) fn add_op(&self, channel: LightChannel, i: u16, op: LightOp) {
        self.channel(channel).work.lock().ops.insert((i, op));
    }

    pub(crate) fn add_update(&self, channel: LightChannel, i: u16, value: u8) {
        self.channel(channel).work.lock().updates.insert(i, value.min(15));
    }

    pub(crate) fn take(&self, channel: LightChannel) -> LightWork {
        std::mem::take(&mut *self.channel(channel).work.lock())
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.block.registered.load(Ordering::Acquire) || self.sky.registered.load(Ordering::Acquire)
    }

    pub(crate) fn clear(&self) {
        for ch in [&self.block, &self.sky] {
            *ch.work.lock() = LightWork::default();
            ch.registered.store(false, Ordering::Release);
        }
    }

    /// True for the caller that flipped the flag; that caller enqueues.
    pub(crate) fn try_register(&self, channel: LightChannel) -> bool {
        !self.channel(channel).registered.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn unregister(&self, channel: LightChannel) {
        self.channel(channel).registered.store(false, Ordering::Release);
    }
}
