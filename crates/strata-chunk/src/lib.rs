//! Chunk storage, save-state machine, and the per-region shared state chunks write into.
#![forbid(unsafe_code)]

pub mod block_store;
pub mod chunk;
pub mod column;
pub mod context;
pub mod error;
pub mod light;
pub mod light_work;
pub mod observer;
pub mod populator;
pub mod queue;
pub mod region_shared;
pub mod save_state;
pub mod snapshot;

pub use block_store::BlockStore;
pub use chunk::{Chunk, ChunkInit, ChunkStorage, DirtyDelta};
pub use column::{Column, HEIGHT_UNKNOWN, HeightChange};
pub use context::{WorldAccess, WorldContext, WorldCounters};
pub use error::ChunkError;
pub use light::{LightBuffers, LightChannel, NibbleArray};
pub use light_work::{LightOp, LightWork};
pub use observer::{ChunkObserver, ChunkSnapshot, ChunkSync, EntityId, ObserverEntry};
pub use populator::Populator;
pub use queue::SetQueue;
pub use region_shared::{DynamicUpdate, DynamicUpdateTree, PhysicsRequest, RegionShared};
pub use save_state::{AtomicSaveState, Drained, SaveState};
pub use snapshot::{SnapshotManager, Snapshotable, SnapshotableMap};
