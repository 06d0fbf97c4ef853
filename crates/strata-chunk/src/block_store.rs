use std::sync::OnceLock;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicUsize, Ordering};

use strata_blocks::Block;
use strata_world::{CHUNK_BITS, CHUNK_SIZE, CHUNK_VOLUME, local_index};

/// Bounded record of changed block indices since the last reset.
struct DirtyList {
    slots: Box<[AtomicU16]>,
    count: AtomicUsize,
}

impl DirtyList {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU16::new(0)).collect(),
            count: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn mark(&self, i: usize) {
        let n = self.count.fetch_add(1, Ordering::AcqRel);
        if n < self.slots.len() {
            self.slots[n].store(i as u16, Ordering::Release);
        }
    }
}

/// Packed `(id << 16) | data` entries for one chunk.
///
/// Starts as a single uniform value; the dense array is allocated by the
/// first write that actually changes something. All mutation is lock-free
/// so readers on other threads never see torn values. Which thread may
/// write is decided by the caller's stage check, not here.
pub struct BlockStore {
    uniform: u32,
    dense: OnceLock<Box<[AtomicU32]>>,
    dirty: DirtyList,
}

impl BlockStore {
    pub fn uniform(block: Block, dirty_capacity: usize) -> Self {
        Self {
            uniform: block.pack(),
            dense: OnceLock::new(),
            dirty: DirtyList::new(dirty_capacity),
        }
    }

    /// Picks the uniform variant when every entry is identical.
    pub fn from_blocks(blocks: &[Block], dirty_capacity: usize) -> Self {
        debug_assert_eq!(blocks.len(), CHUNK_VOLUME);
        let first = blocks.first().copied().unwrap_or(Block::AIR);
        let store = Self::uniform(first, dirty_capacity);
        if blocks.iter().any(|b| *b != first) {
            let dense: Box<[AtomicU32]> = blocks.iter().map(|b| AtomicU32::new(b.pack())).collect();
            let _ = store.dense.set(dense);
        }
        store
    }

    pub fn from_arrays(ids: &[u16], data: &[u16], dirty_capacity: usize) -> Self {
        let blocks: Vec<Block> = ids
            .iter()
            .zip(data.iter())
            .map(|(id, d)| Block::new(*id, *d))
            .collect();
        Self::from_blocks(&blocks, dirty_capacity)
    }

    #[inline]
    fn cells(&self) -> &[AtomicU32] {
        self.dense.get_or_init(|| {
            (0..CHUNK_VOLUME)
                .map(|_| AtomicU32::new(self.uniform))
                .collect()
        })
    }

    pub fn is_uniform(&self) -> bool {
        self.dense.get().is_none()
    }

    #[inline]
    pub fn get_packed(&self, i: usize) -> u32 {
        match self.dense.get() {
            Some(cells) => cells[i].load(Ordering::Acquire),
            None => self.uniform,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Block {
        Block::unpack(self.get_packed(local_index(x, y, z)))
    }

    /// Writes `new` and returns the previous block. Rewriting the current
    /// value is not a change and leaves the dirty list alone.
    pub fn get_and_set(&self, x: usize, y: usize, z: usize, new: Block) -> Block {
        let i = local_index(x, y, z);
        let new = new.pack();
        if self.is_uniform() && self.uniform == new {
            return Block::unpack(new);
        }
        let cell = &self.cells()[i];
        let mut cur = cell.load(Ordering::Acquire);
        loop {
            if cur == new {
                return Block::unpack(cur);
            }
            match cell.compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    self.dirty.mark(i);
                    return Block::unpack(cur);
                }
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn compare_and_set(&self, x: usize, y: usize, z: usize, expect: Block, new: Block) -> bool {
        let i = local_index(x, y, z);
        let (expect, new) = (expect.pack(), new.pack());
        if expect == new {
            return self.get_packed(i) == expect;
        }
        if self.is_uniform() && self.uniform != expect {
            return false;
        }
        let ok = self.cells()[i]
            .compare_exchange(expect, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            self.dirty.mark(i);
        }
        ok
    }

    /// Replaces the bits of `mask` in the data half with `value` shifted into
    /// place. Returns the old field value, shifted down.
    pub fn set_field(&self, x: usize, y: usize, z: usize, mask: u16, value: u16) -> u16 {
        self.update_field(x, y, z, mask, |_| value)
    }

    /// Adds `delta` to the field under `mask`, wrapping inside the field.
    pub fn add_field(&self, x: usize, y: usize, z: usize, mask: u16, delta: u16) -> u16 {
        self.update_field(x, y, z, mask, |old| old.wrapping_add(delta))
    }

    fn update_field(&self, x: usize, y: usize, z: usize, mask: u16, f: impl Fn(u16) -> u16) -> u16 {
        if mask == 0 {
            return 0;
        }
        let shift = mask.trailing_zeros();
        loop {
            let cur = self.get(x, y, z);
            let old_field = (cur.data & mask) >> shift;
            let data = (cur.data & !mask) | ((f(old_field) << shift) & mask);
            let next = Block::new(cur.id, data);
            if next == cur || self.compare_and_set(x, y, z, cur, next) {
                return old_field;
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.count.load(Ordering::Acquire) > 0
    }

    /// More changes happened than the list can name; resend everything.
    pub fn is_dirty_overflow(&self) -> bool {
        self.dirty.count.load(Ordering::Acquire) > self.dirty.slots.len()
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty
            .count
            .load(Ordering::Acquire)
            .min(self.dirty.slots.len())
    }

    /// Local coordinates of the `n`th recorded change.
    pub fn dirty_block_at(&self, n: usize) -> Option<(usize, usize, usize)> {
        if n >= self.dirty_len() {
            return None;
        }
        let i = self.dirty.slots[n].load(Ordering::Acquire) as usize;
        let mask = CHUNK_SIZE - 1;
        Some((i & mask, i >> (2 * CHUNK_BITS), (i >> CHUNK_BITS) & mask))
    }

    pub fn reset_dirty(&self) {
        self.dirty.count.store(0, Ordering::Release);
    }

    /// True when the dense array holds a single repeated value.
    pub fn needs_compression(&self) -> bool {
        match self.dense.get() {
            None => false,
            Some(cells) => {
                let first = cells[0].load(Ordering::Acquire);
                cells.iter().all(|c| c.load(Ordering::Acquire) == first)
            }
        }
    }

    /// Uniform replacement for a dense store whose entries are all equal.
    pub fn compress(&self) -> Option<BlockStore> {
        if !self.needs_compression() {
            return None;
        }
        let value = self.get_packed(0);
        Some(BlockStore::uniform(
            Block::unpack(value),
            self.dirty.slots.len(),
        ))
    }

    pub fn to_arrays(&self) -> (Vec<u16>, Vec<u16>) {
        let mut ids = Vec::with_capacity(CHUNK_VOLUME);
        let mut data = Vec::with_capacity(CHUNK_VOLUME);
        for i in 0..CHUNK_VOLUME {
            let b = Block::unpack(self.get_packed(i));
            ids.push(b.id);
            data.push(b.data);
        }
        (ids, data)
    }
}
