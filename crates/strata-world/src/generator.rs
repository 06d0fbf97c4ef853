use crate::buffer::CuboidBuffer;
use crate::coords::CHUNK_SIZE;

/// Per-(x,z) biome ids for one chunk column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BiomeMap {
    pub ids: Box<[u8]>,
}

impl BiomeMap {
    pub fn uniform(id: u8) -> Self {
        Self {
            ids: vec![id; CHUNK_SIZE * CHUNK_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn get(&self, x: usize, z: usize) -> u8 {
        self.ids[z * CHUNK_SIZE + x]
    }
}

/// Pluggable terrain source. Implementations must be deterministic for a
/// given seed; the region generator calls `generate` once per column.
pub trait TerrainGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Fills `buf` and returns one biome map per chunk column of its
    /// footprint, indexed `oz * w + ox`.
    fn generate(&self, buf: &mut CuboidBuffer) -> Vec<BiomeMap>;

    /// Topmost surface block per (x,z) of chunk column `(cx, cz)`, indexed
    /// `z * 16 + x`, if the generator can answer without a full pass.
    fn surface_heights(&self, cx: i32, cz: i32) -> Option<Vec<i32>>;
}
