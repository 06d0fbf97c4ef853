use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use strata_world::{CHUNK_SIZE, ChunkCoord, REGION_BITS, REGION_CHUNKS, RegionCoord};

use crate::codec::{ChunkRecord, ColumnRecord};
use crate::error::IoError;
use crate::region_file::RegionFile;

const CHUNK_ENTRIES: usize = REGION_CHUNKS * REGION_CHUNKS * REGION_CHUNKS;
const COLUMN_ENTRIES: usize = REGION_CHUNKS * REGION_CHUNKS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum FileKey {
    Chunks(RegionCoord),
    Columns(i32, i32),
}

/// On-disk layout of a world: one container per region for chunks and one
/// per region footprint for column height maps. Open files are cached and
/// closed again once idle.
pub struct WorldStorage {
    dir: PathBuf,
    timeout: Duration,
    files: Mutex<HashMap<FileKey, Arc<RegionFile>>>,
}

impl WorldStorage {
    pub fn new(dir: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            timeout,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: FileKey) -> PathBuf {
        match key {
            FileKey::Chunks(r) => self
                .dir
                .join("region")
                .join(format!("reg{}_{}_{}.srf", r.rx, r.ry, r.rz)),
            FileKey::Columns(rx, rz) => self.dir.join("column").join(format!("col{}_{}.srf", rx, rz)),
        }
    }

    fn file(&self, key: FileKey) -> Result<Arc<RegionFile>, IoError> {
        let mut files = self.files.lock();
        if let Some(f) = files.get(&key) {
            if !f.is_closed() {
                return Ok(f.clone());
            }
        }
        let entries = match key {
            FileKey::Chunks(_) => CHUNK_ENTRIES,
            FileKey::Columns(..) => COLUMN_ENTRIES,
        };
        let f = Arc::new(RegionFile::open(self.path_for(key), entries, self.timeout)?);
        files.insert(key, f.clone());
        Ok(f)
    }

    /// Retries once if the file was closed by the idle sweep in between.
    fn with_file<R>(
        &self,
        key: FileKey,
        op: impl Fn(&RegionFile) -> Result<R, IoError>,
    ) -> Result<R, IoError> {
        match op(&*self.file(key)?) {
            Err(IoError::Closed) => op(&*self.file(key)?),
            other => other,
        }
    }

    fn chunk_entry(coord: ChunkCoord) -> usize {
        let (x, y, z) = coord.region_local();
        (y * REGION_CHUNKS + z) * REGION_CHUNKS + x
    }

    fn column_entry(cx: i32, cz: i32) -> usize {
        let mask = REGION_CHUNKS as i32 - 1;
        ((cz & mask) as usize) * REGION_CHUNKS + (cx & mask) as usize
    }

    pub fn chunk_exists(&self, coord: ChunkCoord) -> bool {
        let i = Self::chunk_entry(coord);
        self.with_file(FileKey::Chunks(coord.region()), |f| f.exists(i))
            .unwrap_or(false)
    }

    /// Missing and unreadable chunks both come back as `None`; corruption is
    /// logged so the caller can regenerate.
    pub fn read_chunk(&self, coord: ChunkCoord) -> Option<ChunkRecord> {
        let i = Self::chunk_entry(coord);
        let bytes = match self.with_file(FileKey::Chunks(coord.region()), |f| f.read(i)) {
            Ok(Some(b)) => b,
            Ok(None) => return None,
            Err(e) => {
                log::error!(target: "io", "chunk read failed coord={:?} err={}", coord, e);
                return None;
            }
        };
        match ChunkRecord::decode(&bytes, coord) {
            Ok(rec) => Some(rec),
            Err(e) => {
                log::error!(target: "io", "chunk decode failed coord={:?} err={}", coord, e);
                None
            }
        }
    }

    pub fn write_chunk(&self, rec: &ChunkRecord) -> Result<(), IoError> {
        let i = Self::chunk_entry(rec.coord);
        let bytes = rec.encode();
        self.with_file(FileKey::Chunks(rec.coord.region()), |f| f.write(i, &bytes))
    }

    pub fn read_column(&self, cx: i32, cz: i32) -> Option<ColumnRecord> {
        let key = FileKey::Columns(cx >> REGION_BITS, cz >> REGION_BITS);
        let i = Self::column_entry(cx, cz);
        let bytes = match self.with_file(key, |f| f.read(i)) {
            Ok(Some(b)) => b,
            Ok(None) => return None,
            Err(e) => {
                log::warn!(target: "io", "column read failed cx={} cz={} err={}", cx, cz, e);
                return None;
            }
        };
        match ColumnRecord::decode(&bytes) {
            Ok(rec) if rec.heights.len() == CHUNK_SIZE * CHUNK_SIZE => Some(rec),
            Ok(_) => None,
            Err(e) => {
                log::warn!(target: "io", "column height map reset cx={} cz={} err={}", cx, cz, e);
                None
            }
        }
    }

    pub fn write_column(&self, cx: i32, cz: i32, rec: &ColumnRecord) -> Result<(), IoError> {
        let key = FileKey::Columns(cx >> REGION_BITS, cz >> REGION_BITS);
        let i = Self::column_entry(cx, cz);
        let bytes = rec.encode();
        self.with_file(key, |f| f.write(i, &bytes))
    }

    /// Closes files idle past the timeout. Returns how many were closed.
    pub fn close_idle(&self) -> usize {
        let mut files = self.files.lock();
        let before = files.len();
        files.retain(|_, f| !f.close_if_timed_out());
        before - files.len()
    }

    pub fn close_all(&self) {
        let mut files = self.files.lock();
        files.retain(|_, f| !f.attempt_close());
        if !files.is_empty() {
            log::warn!(target: "io", "{} region files still busy at close", files.len());
        }
    }
}
