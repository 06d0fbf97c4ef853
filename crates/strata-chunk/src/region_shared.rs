use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use strata_world::{ChunkCoord, REGION_BLOCKS, RegionCoord, thread_token};

use crate::queue::SetQueue;
use crate::snapshot::SnapshotManager;

/// Block position plus the cube radius of neighbors to update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PhysicsRequest {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub range: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicUpdate {
    pub handle: u64,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub time: u64,
    pub data: u32,
}

/// Scheduler for future block updates. The region only enqueues, resets,
/// and drains; the ordering structure is up to the implementation.
pub trait DynamicUpdateTree: Send {
    fn queue(&mut self, x: i32, y: i32, z: i32, time: u64, data: u32) -> u64;
    /// Drops every pending update at the position. Returns how many.
    fn reset(&mut self, x: i32, y: i32, z: i32) -> usize;
    /// Removes and returns all updates with `time <= now`, earliest first.
    fn drain_due(&mut self, now: u64) -> Vec<DynamicUpdate>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Region state that chunks write into: work queues, the snapshot manager,
/// and the identity of the thread currently executing the region.
pub struct RegionShared {
    pub coord: RegionCoord,
    owner: AtomicU64,
    pub snapshots: SnapshotManager,
    pub save_queue: SetQueue<ChunkCoord>,
    pub dirty_queue: SetQueue<ChunkCoord>,
    pub populate_queue: SetQueue<ChunkCoord>,
    pub priority_populate_queue: SetQueue<ChunkCoord>,
    pub physics_local: SetQueue<PhysicsRequest>,
    pub physics_global: SetQueue<PhysicsRequest>,
    pub dynamic: Mutex<Box<dyn DynamicUpdateTree>>,
}

impl RegionShared {
    pub fn new(coord: RegionCoord, dynamic: Box<dyn DynamicUpdateTree>) -> Self {
        Self {
            coord,
            owner: AtomicU64::new(0),
            snapshots: SnapshotManager::new(),
            save_queue: SetQueue::new(),
            dirty_queue: SetQueue::new(),
            populate_queue: SetQueue::new(),
            priority_populate_queue: SetQueue::new(),
            physics_local: SetQueue::new(),
            physics_global: SetQueue::new(),
            dynamic: Mutex::new(dynamic),
        }
    }

    /// Makes the calling thread the region's executor for the current stage.
    pub fn bind_owner(&self) {
        self.owner.store(thread_token(), Ordering::Release);
    }

    pub fn release_owner(&self) {
        self.owner.store(0, Ordering::Release);
    }

    #[inline]
    pub fn owner(&self) -> u64 {
        self.owner.load(Ordering::Acquire)
    }

    pub fn contains_block(&self, x: i32, y: i32, z: i32) -> bool {
        RegionCoord::from_block(x, y, z) == self.coord
    }

    /// Whether the cube of radius `r` around the block lies inside this region.
    pub fn contains_cube(&self, x: i32, y: i32, z: i32, r: u8) -> bool {
        let r = i32::from(r);
        let (bx, by, bz) = self.coord.block_base();
        let side = REGION_BLOCKS as i32;
        let inside = |v: i32, base: i32| v - r >= base && v + r < base + side;
        inside(x, bx) && inside(y, by) && inside(z, bz)
    }

    /// Requests whose cube stays inside this region run in the local pass;
    /// the rest wait for the sequenced global pass.
    pub fn queue_physics(&self, req: PhysicsRequest) {
        if self.contains_cube(req.x, req.y, req.z, req.range) {
            self.physics_local.push(req);
        } else {
            self.physics_global.push(req);
        }
    }

    pub fn queue_dynamic(&self, x: i32, y: i32, z: i32, time: u64, data: u32) -> u64 {
        self.dynamic.lock().queue(x, y, z, time, data)
    }

    pub fn reset_dynamic(&self, x: i32, y: i32, z: i32) -> usize {
        self.dynamic.lock().reset(x, y, z)
    }
}
