use std::sync::atomic::{AtomicU8, Ordering};

use strata_world::{CHUNK_VOLUME, local_index};

/// 4-bit values, two per byte, low nibble first.
pub struct NibbleArray {
    bytes: Box<[AtomicU8]>,
}

impl NibbleArray {
    pub fn filled(value: u8) -> Self {
        let v = value & 0x0F;
        let byte = v | (v << 4);
        Self {
            bytes: (0..CHUNK_VOLUME / 2).map(|_| AtomicU8::new(byte)).collect(),
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut bytes: Vec<AtomicU8> = raw.iter().map(|b| AtomicU8::new(*b)).collect();
        bytes.resize_with(CHUNK_VOLUME / 2, || AtomicU8::new(0));
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> u8 {
        let b = self.bytes[i >> 1].load(Ordering::Acquire);
        if i & 1 == 0 { b & 0x0F } else { b >> 4 }
    }

    /// Stores `value` (clamped to 15) and returns the old value.
    pub fn set(&self, i: usize, value: u8) -> u8 {
        let v = value.min(15);
        let cell = &self.bytes[i >> 1];
        let mut cur = cell.load(Ordering::Acquire);
        loop {
            let (old, next) = if i & 1 == 0 {
                (cur & 0x0F, (cur & 0xF0) | v)
            } else {
                (cur >> 4, (cur & 0x0F) | (v << 4))
            };
            if old == v {
                return old;
            }
            match cell.compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return old,
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn fill(&self, value: u8) {
        let v = value & 0x0F;
        for b in self.bytes.iter() {
            b.store(v | (v << 4), Ordering::Release);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.load(Ordering::Acquire)).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightChannel {
    Block,
    Sky,
}

/// Sky and block light for one chunk, indexed like the block store.
pub struct LightBuffers {
    pub sky: NibbleArray,
    pub block: NibbleArray,
}

impl LightBuffers {
    pub fn dark() -> Self {
        Self {
            sky: NibbleArray::filled(0),
            block: NibbleArray::filled(0),
        }
    }

    pub fn from_bytes(sky: &[u8], block: &[u8]) -> Self {
        Self {
            sky: NibbleArray::from_bytes(sky),
            block: NibbleArray::from_bytes(block),
        }
    }

    #[inline]
    pub fn channel(&self, channel: LightChannel) -> &NibbleArray {
        match channel {
            LightChannel::Block => &self.block,
            LightChannel::Sky => &self.sky,
        }
    }

    #[inline]
    pub fn get(&self, channel: LightChannel, x: usize, y: usize, z: usize) -> u8 {
        self.channel(channel).get(local_index(x, y, z))
    }

    #[inline]
    pub fn set(&self, channel: LightChannel, x: usize, y: usize, z: usize, value: u8) -> u8 {
        self.channel(channel).set(local_index(x, y, z), value)
    }
}
