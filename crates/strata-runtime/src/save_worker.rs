use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use hashbrown::HashMap;
use parking_lot::Mutex;
use strata_chunk::WorldContext;
use strata_io::{ChunkRecord, ColumnRecord, WorldStorage};
use strata_world::ChunkCoord;

enum SaveJob {
    Chunk(ChunkCoord),
    Column(i32, i32),
}

/// Records handed to the writer but not yet on disk. Readers consult this
/// before storage so a chunk unloaded this tick reloads with its latest
/// contents.
#[derive(Default)]
struct Pending {
    chunks: Mutex<HashMap<ChunkCoord, (u64, Arc<ChunkRecord>)>>,
    columns: Mutex<HashMap<(i32, i32), (u64, Arc<ColumnRecord>)>>,
    seq: AtomicU64,
}

impl Pending {
    fn next(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Dedicated writer thread for chunk and column records.
pub struct SaveWorker {
    tx: Mutex<Option<Sender<SaveJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<Pending>,
}

impl SaveWorker {
    pub fn new(storage: Arc<WorldStorage>, ctx: Arc<WorldContext>) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<SaveJob>();
        let pending = Arc::new(Pending::default());
        let shared = pending.clone();
        let handle = thread::Builder::new()
            .name("strata-save".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        SaveJob::Chunk(coord) => {
                            let Some((seq, rec)) = shared.chunks.lock().get(&coord).cloned() else {
                                continue;
                            };
                            match storage.write_chunk(&rec) {
                                Ok(()) => {
                                    ctx.counters.saved_chunks.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(e) => {
                                    log::error!(target: "io", "chunk save failed coord={:?} err={}", coord, e);
                                }
                            }
                            let mut chunks = shared.chunks.lock();
                            if chunks.get(&coord).is_some_and(|(s, _)| *s == seq) {
                                chunks.remove(&coord);
                            }
                        }
                        SaveJob::Column(cx, cz) => {
                            let Some((seq, rec)) = shared.columns.lock().get(&(cx, cz)).cloned() else {
                                continue;
                            };
                            if let Err(e) = storage.write_column(cx, cz, &rec) {
                                log::error!(target: "io", "column save failed cx={} cz={} err={}", cx, cz, e);
                            }
                            let mut columns = shared.columns.lock();
                            if columns.get(&(cx, cz)).is_some_and(|(s, _)| *s == seq) {
                                columns.remove(&(cx, cz));
                            }
                        }
                    }
                }
                log::debug!(target: "io", "save worker exiting");
            })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            pending,
        })
    }

    pub fn submit_chunk(&self, rec: ChunkRecord) {
        let coord = rec.coord;
        let seq = self.pending.next();
        self.pending.chunks.lock().insert(coord, (seq, Arc::new(rec)));
        self.send(SaveJob::Chunk(coord));
    }

    pub fn submit_column(&self, cx: i32, cz: i32, rec: ColumnRecord) {
        let seq = self.pending.next();
        self.pending.columns.lock().insert((cx, cz), (seq, Arc::new(rec)));
        self.send(SaveJob::Column(cx, cz));
    }

    fn send(&self, job: SaveJob) {
        let sent = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        };
        if !sent {
            log::warn!(target: "io", "save submitted after shutdown; record stays pending");
        }
    }

    pub fn pending_chunk(&self, coord: ChunkCoord) -> Option<Arc<ChunkRecord>> {
        self.pending.chunks.lock().get(&coord).map(|(_, r)| r.clone())
    }

    pub fn pending_column(&self, cx: i32, cz: i32) -> Option<Arc<ColumnRecord>> {
        self.pending.columns.lock().get(&(cx, cz)).map(|(_, r)| r.clone())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.chunks.lock().len() + self.pending.columns.lock().len()
    }

    /// Writes everything queued so far, then stops the thread.
    pub fn shutdown(&self) {
        drop(self.tx.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!(target: "io", "save worker panicked");
            }
        }
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
