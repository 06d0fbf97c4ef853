use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use strata_blocks::MaterialRegistry;
use strata_world::{ChunkCoord, TickClock, WorldConfig};

use crate::chunk::Chunk;
use crate::light::LightChannel;
use crate::queue::SetQueue;

/// Lookups a chunk needs from the world that owns it.
pub trait WorldAccess: Send + Sync {
    /// A chunk that is currently in some region grid. Never loads.
    fn loaded_chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>>;
    /// Called once the last chunk of a column has deregistered.
    fn release_column(&self, cx: i32, cz: i32);
}

#[derive(Debug, Default)]
pub struct WorldCounters {
    pub loaded_chunks: AtomicUsize,
    pub observed_chunks: AtomicUsize,
    pub generated_chunks: AtomicU64,
    pub saved_chunks: AtomicU64,
    pub entity_failures: AtomicU64,
}

/// Shared per-world state handed to every region and chunk.
pub struct WorldContext {
    pub registry: Arc<MaterialRegistry>,
    pub config: WorldConfig,
    pub clock: TickClock,
    pub counters: WorldCounters,
    block_light_queue: SetQueue<ChunkCoord>,
    sky_light_queue: SetQueue<ChunkCoord>,
    generation: AtomicU64,
    time_ms: AtomicU64,
    world: OnceLock<Weak<dyn WorldAccess>>,
}

impl WorldContext {
    pub fn new(registry: Arc<MaterialRegistry>, config: WorldConfig) -> Self {
        Self {
            registry,
            config,
            clock: TickClock::new(),
            counters: WorldCounters::default(),
            block_light_queue: SetQueue::new(),
            sky_light_queue: SetQueue::new(),
            generation: AtomicU64::new(0),
            time_ms: AtomicU64::new(0),
            world: OnceLock::new(),
        }
    }

    /// First binding wins.
    pub fn bind_world(&self, world: Weak<dyn WorldAccess>) -> bool {
        self.world.set(world).is_ok()
    }

    pub fn world(&self) -> Option<Arc<dyn WorldAccess>> {
        self.world.get().and_then(|w| w.upgrade())
    }

    pub fn loaded_chunk(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.world()?.loaded_chunk(coord)
    }

    pub fn chunk_at_block(&self, x: i32, y: i32, z: i32) -> Option<Arc<Chunk>> {
        self.loaded_chunk(ChunkCoord::from_block(x, y, z))
    }

    /// Chunks with pending work for one light channel, in arrival order.
    pub fn light_queue(&self, channel: LightChannel) -> &SetQueue<ChunkCoord> {
        match channel {
            LightChannel::Block => &self.block_light_queue,
            LightChannel::Sky => &self.sky_light_queue,
        }
    }

    /// Strictly increasing; 0 is never handed out.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    pub fn time_ms(&self) -> u64 {
        self.time_ms.load(Ordering::Acquire)
    }

    pub fn advance_time(&self, dt_ms: u64) -> u64 {
        self.time_ms.fetch_add(dt_ms, Ordering::AcqRel) + dt_ms
    }
}
