use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use hashbrown::HashMap;
use parking_lot::RwLock;
use strata_chunk::{ChunkError, ChunkObserver, EntityId};
use strata_world::ChunkCoord;

use crate::region::LoadPolicy;
use crate::world::World;

/// Something that lives in the world, acts once per tick, and keeps the
/// chunks around it loaded.
pub trait Entity: ChunkObserver {
    fn tick(&self, world: &World, dt_ms: u64) -> Result<(), Box<dyn Error + Send + Sync>>;
}

struct Tracked {
    entity: Arc<dyn Entity>,
    observer: Arc<dyn ChunkObserver>,
    home: Option<ChunkCoord>,
}

/// Entities ticked by the scheduler at tick start.
#[derive(Default)]
pub struct EntityManager {
    entities: RwLock<HashMap<EntityId, Tracked>>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<E: Entity + 'static>(&self, entity: Arc<E>) {
        let id = entity.id();
        let observer: Arc<dyn ChunkObserver> = entity.clone();
        self.entities.write().insert(
            id,
            Tracked {
                entity,
                observer,
                home: None,
            },
        );
        log::debug!(target: "tick", "entity added id={:?}", id);
    }

    pub fn remove(&self, id: EntityId) -> bool {
        self.entities.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ticks every entity, then refreshes the chunks each one watches.
    /// A failing entity is logged and counted; the rest still run.
    /// Returns the number of failures.
    pub fn tick_all(&self, world: &World, dt_ms: u64) -> usize {
        let mut failures = 0;
        let mut entities = self.entities.write();
        entities.retain(|id, t| {
            if t.entity.is_online() {
                return true;
            }
            log::debug!(target: "tick", "entity offline id={:?}", id);
            false
        });
        for (id, t) in entities.iter_mut() {
            if let Err(e) = t.entity.tick(world, dt_ms) {
                failures += 1;
                world
                    .context()
                    .counters
                    .entity_failures
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!(target: "tick", "entity tick failed id={:?} err={}", id, e);
                continue;
            }
            Self::observe(world, t);
        }
        failures
    }

    fn observe(world: &World, t: &mut Tracked) {
        let pos = t.observer.position();
        let r = t.observer.view_distance() as i32;
        for dy in -r..=r {
            for dz in -r..=r {
                for dx in -r..=r {
                    let coord = pos.offset(dx, dy, dz);
                    let chunk = match world.get_chunk(coord, LoadPolicy::LoadOrQueueGenerate) {
                        Ok(Some(c)) => c,
                        Ok(None) => continue,
                        Err(e) => {
                            log::debug!(target: "tick", "observe skipped coord={:?} err={}", coord, e);
                            continue;
                        }
                    };
                    match chunk.refresh_observer(t.observer.clone()) {
                        Ok(_) | Err(ChunkError::StaleChunk(_)) => {}
                        Err(e) => {
                            log::debug!(target: "tick", "observe failed coord={:?} err={}", coord, e);
                        }
                    }
                }
            }
        }
        if t.home == Some(pos) {
            return;
        }
        if let Ok(Some(chunk)) = world.get_chunk(pos, LoadPolicy::NoLoad) {
            if chunk.add_entity(t.observer.clone()).is_ok() {
                t.home = Some(pos);
            }
        }
    }
}
