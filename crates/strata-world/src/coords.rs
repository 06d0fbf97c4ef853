use serde::{Deserialize, Serialize};

pub const CHUNK_BITS: u32 = 4;
pub const CHUNK_SIZE: usize = 1 << CHUNK_BITS;
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;
pub const REGION_BITS: u32 = 4;
/// Chunks per region side.
pub const REGION_CHUNKS: usize = 1 << REGION_BITS;
/// Blocks per region side.
pub const REGION_BLOCKS: usize = REGION_CHUNKS * CHUNK_SIZE;

const CHUNK_MASK: i32 = CHUNK_SIZE as i32 - 1;
const REGION_MASK: i32 = REGION_CHUNKS as i32 - 1;

/// Linear index inside a chunk; x varies fastest, then z, then y.
#[inline]
pub fn local_index(x: usize, y: usize, z: usize) -> usize {
    (y * CHUNK_SIZE + z) * CHUNK_SIZE + x
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cy: i32,
    pub cz: i32,
}

impl ChunkCoord {
    #[inline]
    pub const fn new(cx: i32, cy: i32, cz: i32) -> Self {
        Self { cx, cy, cz }
    }

    #[inline]
    pub fn from_block(x: i32, y: i32, z: i32) -> Self {
        Self::new(
            x >> CHUNK_BITS,
            y >> CHUNK_BITS,
            z >> CHUNK_BITS,
        )
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            cx: self.cx + dx,
            cy: self.cy + dy,
            cz: self.cz + dz,
        }
    }

    /// World coordinates of block (0,0,0) in this chunk.
    #[inline]
    pub fn base(self) -> (i32, i32, i32) {
        (
            self.cx << CHUNK_BITS,
            self.cy << CHUNK_BITS,
            self.cz << CHUNK_BITS,
        )
    }

    #[inline]
    pub fn region(self) -> RegionCoord {
        RegionCoord::new(
            self.cx >> REGION_BITS,
            self.cy >> REGION_BITS,
            self.cz >> REGION_BITS,
        )
    }

    /// Position inside the owning region, each axis in `0..REGION_CHUNKS`.
    #[inline]
    pub fn region_local(self) -> (usize, usize, usize) {
        (
            (self.cx & REGION_MASK) as usize,
            (self.cy & REGION_MASK) as usize,
            (self.cz & REGION_MASK) as usize,
        )
    }
}

impl From<(i32, i32, i32)> for ChunkCoord {
    fn from(value: (i32, i32, i32)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

impl From<ChunkCoord> for (i32, i32, i32) {
    fn from(value: ChunkCoord) -> Self {
        (value.cx, value.cy, value.cz)
    }
}

/// Block position within its chunk.
#[inline]
pub fn block_local(x: i32, y: i32, z: i32) -> (usize, usize, usize) {
    (
        (x & CHUNK_MASK) as usize,
        (y & CHUNK_MASK) as usize,
        (z & CHUNK_MASK) as usize,
    )
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionCoord {
    pub rx: i32,
    pub ry: i32,
    pub rz: i32,
}

impl RegionCoord {
    #[inline]
    pub const fn new(rx: i32, ry: i32, rz: i32) -> Self {
        Self { rx, ry, rz }
    }

    #[inline]
    pub fn from_block(x: i32, y: i32, z: i32) -> Self {
        ChunkCoord::from_block(x, y, z).region()
    }

    /// First chunk coordinate covered by this region.
    #[inline]
    pub fn chunk_base(self) -> ChunkCoord {
        ChunkCoord::new(
            self.rx << REGION_BITS,
            self.ry << REGION_BITS,
            self.rz << REGION_BITS,
        )
    }

    #[inline]
    pub fn chunk_at(self, lx: usize, ly: usize, lz: usize) -> ChunkCoord {
        self.chunk_base()
            .offset(lx as i32, ly as i32, lz as i32)
    }

    /// World block coordinates of this region's minimum corner.
    #[inline]
    pub fn block_base(self) -> (i32, i32, i32) {
        self.chunk_base().base()
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.rx + dx, self.ry + dy, self.rz + dz)
    }
}
