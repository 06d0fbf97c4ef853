use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use strata_lighting::{LightStats, LightingEngine};
use strata_world::Stage;

use crate::entity::EntityManager;
use crate::error::RegionError;
use crate::region::{Region, SEQUENCES};
use crate::world::World;

/// What one tick did.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickReport {
    pub tick: u64,
    pub regions: usize,
    pub removed_regions: usize,
    pub entity_failures: usize,
    pub light: LightStats,
    pub elapsed: Duration,
}

/// Drives the world through its tick stages. Region work fans out over a
/// dedicated pool; lighting and entities run on the calling thread, which
/// becomes the world's main thread.
pub struct Scheduler {
    world: Arc<World>,
    lighting: LightingEngine,
    entities: EntityManager,
    pool: ThreadPool,
    tick_ms: u64,
    close_idle_every: u64,
}

impl Scheduler {
    pub fn new(world: Arc<World>, region_workers: usize, tick_ms: u64) -> Result<Self, Box<dyn Error>> {
        let ctx = world.context().clone();
        ctx.clock.bind_main_thread();
        ctx.clock.set_stage(Stage::IDLE);
        let pool = ThreadPoolBuilder::new()
            .num_threads(region_workers.max(1))
            .thread_name(|i| format!("strata-region-{i}"))
            .build()?;
        Ok(Self {
            lighting: LightingEngine::new(ctx),
            entities: EntityManager::new(),
            pool,
            tick_ms: tick_ms.max(1),
            close_idle_every: 200,
            world,
        })
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    pub fn lighting(&self) -> &LightingEngine {
        &self.lighting
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    fn stage<F>(&self, regions: &[Arc<Region>], stage: Stage, f: F) -> Result<(), RegionError>
    where
        F: Fn(&Region) -> Result<(), RegionError> + Sync + Send,
    {
        self.world.context().clock.set_stage(stage);
        let res = self.pool.install(|| {
            regions.par_iter().try_for_each(|r| {
                let out = f(r);
                r.shared().release_owner();
                out
            })
        });
        if let Err(e) = &res {
            log::error!(target: "tick", "stage failed stage={} err={}", stage.name(), e);
        }
        res
    }

    /// Runs one full tick. The world is back in the idle stage afterwards,
    /// even on error.
    pub fn tick(&self) -> Result<TickReport, RegionError> {
        let started = Instant::now();
        let out = self.run_stages();
        self.world.context().clock.set_stage(Stage::IDLE);
        let mut report = out?;
        report.elapsed = started.elapsed();
        if report.tick % self.close_idle_every == 0 {
            let closed = self.world.storage().close_idle();
            if closed > 0 {
                log::debug!(target: "io", "closed idle region files count={}", closed);
            }
        }
        Ok(report)
    }

    fn run_stages(&self) -> Result<TickReport, RegionError> {
        let ctx = self.world.context();
        let tick = ctx.clock.advance_tick();
        let time = ctx.advance_time(self.tick_ms);
        let dt = self.tick_ms;

        ctx.clock.set_stage(Stage::TICKSTART);
        let entity_failures = self.entities.tick_all(&self.world, dt);
        let regions = self.world.regions();
        self.stage(&regions, Stage::TICKSTART, |r| r.start_tick(dt))?;

        self.stage(&regions, Stage::PHYSICS, |r| r.run_physics(-1).map(|_| ()))?;
        for seq in 0..SEQUENCES {
            self.stage(&regions, Stage::GLOBAL_PHYSICS, |r| r.run_physics(seq).map(|_| ()))?;
        }
        self.stage(&regions, Stage::DYNAMIC_BLOCKS, |r| {
            r.run_dynamic_updates(time, -1).map(|_| ())
        })?;
        for seq in 0..SEQUENCES {
            self.stage(&regions, Stage::GLOBAL_DYNAMIC_BLOCKS, |r| {
                r.run_dynamic_updates(time, seq).map(|_| ())
            })?;
        }

        ctx.clock.set_stage(Stage::LIGHTING);
        let light = self.lighting.resolve_tick().map_err(|e| {
            log::error!(target: "tick", "lighting failed err={}", e);
            RegionError::from(e)
        })?;

        self.stage(&regions, Stage::FINALIZE, |r| r.finalize())?;
        self.stage(&regions, Stage::PRESNAPSHOT, |r| r.pre_snapshot())?;

        let removed_regions = {
            let _write = self.world.snapshot_lock().write();
            let regions = self.world.regions();
            ctx.clock.set_stage(Stage::SNAPSHOT);
            let empty: Vec<_> = self.pool.install(|| {
                regions
                    .par_iter()
                    .map(|r| {
                        let out = r.copy_snapshot();
                        r.shared().release_owner();
                        out.map(|empty| empty.then_some(r.coord()))
                    })
                    .collect::<Result<Vec<_>, RegionError>>()
            })?;
            empty
                .into_iter()
                .flatten()
                .filter(|c| self.world.remove_region_if_empty(*c))
                .count()
        };

        let report = TickReport {
            tick,
            regions: regions.len(),
            removed_regions,
            entity_failures,
            light,
            elapsed: Duration::ZERO,
        };
        log::trace!(
            target: "tick",
            "tick={} regions={} removed={} light_batches={}",
            tick,
            report.regions,
            removed_regions,
            light.batches
        );
        Ok(report)
    }

    /// Ticks `ticks` times at the configured rate. Stops at the first
    /// failing tick.
    pub fn run(&self, ticks: u64) -> Result<(), RegionError> {
        let period = Duration::from_millis(self.tick_ms);
        for _ in 0..ticks {
            let report = self.tick()?;
            if report.tick % 100 == 0 {
                let s = self.world.stats();
                log::info!(
                    target: "tick",
                    "tick={} regions={} loaded={} observed={} generated={} saved={} took_ms={}",
                    report.tick,
                    s.regions,
                    s.loaded_chunks,
                    s.observed_chunks,
                    s.generated_chunks,
                    s.saved_chunks,
                    report.elapsed.as_millis()
                );
            }
            if let Some(rest) = period.checked_sub(report.elapsed) {
                std::thread::sleep(rest);
            }
        }
        Ok(())
    }
}
