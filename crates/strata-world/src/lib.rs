//! World coordinates, tick stages, configuration, and terrain generation.
#![forbid(unsafe_code)]

pub mod buffer;
pub mod config;
pub mod coords;
pub mod generator;
pub mod stage;
pub mod worldgen;

pub use buffer::CuboidBuffer;
pub use config::WorldConfig;
pub use coords::{
    CHUNK_BITS, CHUNK_SIZE, CHUNK_VOLUME, ChunkCoord, REGION_BITS, REGION_BLOCKS, REGION_CHUNKS,
    RegionCoord, block_local, local_index,
};
pub use generator::{BiomeMap, TerrainGenerator};
pub use stage::{Stage, StageViolation, TickClock, thread_token};
pub use worldgen::{FlatGenerator, GeneratorConfig, NoiseGenerator, build_generator};
