use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender, unbounded};
use hashbrown::HashSet;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use strata_world::{ChunkCoord, RegionCoord};

use crate::generator::{refresh_borders, touch_neighbors};
use crate::region::Region;
use crate::world::World;

pub(crate) enum GenJob {
    /// Generate one column range of a region.
    Column { region: Arc<Region>, index: usize },
    /// Refresh loaded chunks around a freshly generated range, then
    /// optionally generate the neighbor ranges.
    Borders {
        world: Weak<World>,
        origin: ChunkCoord,
        width: usize,
        touch: bool,
    },
}

/// Background generation lane.
pub struct GenerationPool {
    tx: Mutex<Option<Sender<GenJob>>>,
    done_rx: Receiver<()>,
    queued: Arc<Mutex<HashSet<(RegionCoord, usize)>>>,
    stopping: Arc<AtomicBool>,
    _pool: ThreadPool,
}

impl GenerationPool {
    pub fn new(workers: usize) -> Result<Self, Box<dyn Error>> {
        let workers = workers.max(1);
        let (tx, rx) = unbounded::<GenJob>();
        // Each worker holds a sender; recv fails once they have all exited.
        let (done_tx, done_rx) = unbounded::<()>();
        let queued = Arc::new(Mutex::new(HashSet::new()));
        let stopping = Arc::new(AtomicBool::new(false));
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("strata-gen-{i}"))
            .build()?;
        for _ in 0..workers {
            let rx = rx.clone();
            let done_tx = done_tx.clone();
            let queued = queued.clone();
            let stopping = stopping.clone();
            pool.spawn(move || {
                while let Ok(job) = rx.recv() {
                    let skip = stopping.load(Ordering::Acquire);
                    match job {
                        GenJob::Column { region, index } => {
                            queued.lock().remove(&(region.coord(), index));
                            if !skip {
                                run_column(&region, index);
                            }
                            region.job_finished();
                        }
                        GenJob::Borders {
                            world,
                            origin,
                            width,
                            touch,
                        } => {
                            if skip {
                                continue;
                            }
                            if let Some(world) = world.upgrade() {
                                refresh_borders(&world, origin, width);
                                if touch {
                                    touch_neighbors(&world, origin, width);
                                }
                            }
                        }
                    }
                }
                drop(done_tx);
            });
        }
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            done_rx,
            queued,
            stopping,
            _pool: pool,
        })
    }

    /// Queues generation of one range unless it is already queued. Returns
    /// whether a job was added.
    pub(crate) fn submit_column(&self, region: Arc<Region>, index: usize) -> bool {
        if !self.queued.lock().insert((region.coord(), index)) {
            return false;
        }
        region.job_started();
        let coord = region.coord();
        let sent = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(GenJob::Column { region: region.clone(), index }).is_ok(),
            None => false,
        };
        if !sent {
            self.queued.lock().remove(&(coord, index));
            region.job_finished();
        }
        sent
    }

    pub(crate) fn submit_borders(&self, world: Weak<World>, origin: ChunkCoord, width: usize, touch: bool) {
        if let Some(tx) = self.tx.lock().as_ref() {
            if tx
                .send(GenJob::Borders {
                    world,
                    origin,
                    width,
                    touch,
                })
                .is_err()
            {
                log::debug!(target: "gen", "border job dropped origin={:?}", origin);
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.queued.lock().len()
    }

    /// Drops queued work and waits for running jobs to finish.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        drop(self.tx.lock().take());
        while self.done_rx.recv().is_ok() {}
    }
}

fn run_column(region: &Region, index: usize) {
    let world = match region.world() {
        Ok(w) => w,
        Err(_) => return,
    };
    if let Err(e) = region.generator().generate(&world, region, index, false) {
        log::warn!(
            target: "gen",
            "background generation failed region={:?} column={} err={}",
            region.coord(),
            index,
            e
        );
    }
}
