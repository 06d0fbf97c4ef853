//! Regions, background generation and saving, and the tick scheduler.
#![forbid(unsafe_code)]

mod buffer_pool;
mod dynamic_tree;
mod entity;
mod error;
mod gen_pool;
mod generator;
mod region;
mod save_worker;
mod scheduler;
mod snapshot_lock;
mod world;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use dynamic_tree::TimedUpdates;
pub use entity::{Entity, EntityManager};
pub use error::RegionError;
pub use gen_pool::GenerationPool;
pub use generator::{ColumnState, RegionGenerator};
pub use region::{LoadPolicy, Region, SEQUENCES};
pub use save_worker::SaveWorker;
pub use scheduler::{Scheduler, TickReport};
pub use snapshot_lock::{SnapshotLock, SnapshotReadGuard};
pub use world::{World, WorldStats};

#[cfg(test)]
mod tests;
