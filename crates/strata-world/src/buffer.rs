use strata_blocks::Block;

use crate::coords::{CHUNK_SIZE, CHUNK_VOLUME, ChunkCoord, local_index};

/// Dense block volume that terrain generators write into.
#[derive(Clone, Debug)]
pub struct CuboidBuffer {
    pub base: (i32, i32, i32),
    pub sx: usize,
    pub sy: usize,
    pub sz: usize,
    pub blocks: Vec<Block>,
}

impl CuboidBuffer {
    pub fn new(base: (i32, i32, i32), sx: usize, sy: usize, sz: usize) -> Self {
        Self {
            base,
            sx,
            sy,
            sz,
            blocks: vec![Block::AIR; sx * sy * sz],
        }
    }

    /// Buffer covering `w` x `h` x `w` chunks starting at `origin`.
    pub fn for_chunks(origin: ChunkCoord, w: usize, h: usize) -> Self {
        Self::new(
            origin.base(),
            w * CHUNK_SIZE,
            h * CHUNK_SIZE,
            w * CHUNK_SIZE,
        )
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.sz + z) * self.sx + x
    }

    #[inline]
    pub fn get_local(&self, x: usize, y: usize, z: usize) -> Block {
        self.blocks[self.idx(x, y, z)]
    }

    #[inline]
    pub fn set_local(&mut self, x: usize, y: usize, z: usize, b: Block) {
        let i = self.idx(x, y, z);
        self.blocks[i] = b;
    }

    #[inline]
    pub fn contains_world(&self, wx: i32, wy: i32, wz: i32) -> bool {
        let (bx, by, bz) = self.base;
        wx >= bx
            && wy >= by
            && wz >= bz
            && wx < bx + self.sx as i32
            && wy < by + self.sy as i32
            && wz < bz + self.sz as i32
    }

    #[inline]
    pub fn get_world(&self, wx: i32, wy: i32, wz: i32) -> Option<Block> {
        if !self.contains_world(wx, wy, wz) {
            return None;
        }
        let (bx, by, bz) = self.base;
        Some(self.get_local(
            (wx - bx) as usize,
            (wy - by) as usize,
            (wz - bz) as usize,
        ))
    }

    /// Copies the chunk at chunk offset `(ox, oy, oz)` into chunk index order.
    pub fn chunk_blocks(&self, ox: usize, oy: usize, oz: usize) -> Vec<Block> {
        let mut out = vec![Block::AIR; CHUNK_VOLUME];
        let (x0, y0, z0) = (ox * CHUNK_SIZE, oy * CHUNK_SIZE, oz * CHUNK_SIZE);
        for y in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let row = self.idx(x0, y0 + y, z0 + z);
                let dst = local_index(0, y, z);
                out[dst..dst + CHUNK_SIZE].copy_from_slice(&self.blocks[row..row + CHUNK_SIZE]);
            }
        }
        out
    }

    #[inline]
    pub fn is_all_air(&self) -> bool {
        self.blocks.iter().all(|b| *b == Block::AIR)
    }
}
