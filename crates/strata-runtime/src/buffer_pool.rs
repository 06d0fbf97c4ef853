use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};
use strata_blocks::Block;
use strata_world::{CuboidBuffer, ChunkCoord, REGION_CHUNKS};

/// Reuses the large generation buffers across column jobs.
pub struct BufferPool {
    available_tx: Sender<CuboidBuffer>,
    available_rx: Receiver<CuboidBuffer>,
    allocated: AtomicUsize,
    max_buffers: usize,
    width: usize,
}

impl BufferPool {
    /// Buffers span `width` x region-height x `width` chunks.
    pub fn new(max_buffers: usize, width: usize) -> Self {
        let max_buffers = max_buffers.max(1);
        let (tx, rx) = bounded(max_buffers);
        Self {
            available_tx: tx,
            available_rx: rx,
            allocated: AtomicUsize::new(0),
            max_buffers,
            width,
        }
    }

    /// A cleared buffer based at `origin`, blocking while all are in use.
    pub fn acquire(&self, origin: ChunkCoord) -> PooledBuffer<'_> {
        if let Ok(buf) = self.available_rx.try_recv() {
            return self.prepared(buf, origin);
        }
        loop {
            let current = self.allocated.load(Ordering::Acquire);
            if current < self.max_buffers {
                let prev = self.allocated.fetch_add(1, Ordering::AcqRel);
                if prev < self.max_buffers {
                    let buf = CuboidBuffer::for_chunks(origin, self.width, REGION_CHUNKS);
                    return PooledBuffer {
                        buf: Some(buf),
                        pool: self,
                    };
                }
                self.allocated.fetch_sub(1, Ordering::AcqRel);
            }
            if let Ok(buf) = self.available_rx.recv() {
                return self.prepared(buf, origin);
            }
        }
    }

    fn prepared(&self, mut buf: CuboidBuffer, origin: ChunkCoord) -> PooledBuffer<'_> {
        buf.base = origin.base();
        buf.blocks.fill(Block::AIR);
        PooledBuffer {
            buf: Some(buf),
            pool: self,
        }
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    fn release(&self, buf: CuboidBuffer) {
        let _ = self.available_tx.send(buf);
    }
}

pub struct PooledBuffer<'pool> {
    buf: Option<CuboidBuffer>,
    pool: &'pool BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = CuboidBuffer;

    fn deref(&self) -> &Self::Target {
        self.buf.as_ref().expect("buffer already released")
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_mut().expect("buffer already released")
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_buffers_come_back_clean() {
        let pool = BufferPool::new(1, 1);
        {
            let mut b = pool.acquire(ChunkCoord::new(0, 0, 0));
            b.set_local(1, 2, 3, Block::new(7, 0));
        }
        let b = pool.acquire(ChunkCoord::new(2, 0, 5));
        assert_eq!(pool.allocated(), 1);
        assert_eq!(b.base, (32, 0, 80));
        assert!(b.is_all_air());
    }
}
