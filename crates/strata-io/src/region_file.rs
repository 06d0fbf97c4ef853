use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use parking_lot::{Mutex, RwLock};

use crate::error::IoError;

pub const VERSION: i32 = 1;
/// Default segment size is `1 << 8` bytes.
pub const DEFAULT_SEGMENT_SHIFT: u32 = 8;
/// Segment shifts accepted from a header.
pub const SEGMENT_SHIFTS: std::ops::RangeInclusive<u32> = 4..=20;

const CLOSED: usize = usize::MAX;
const FAT_OFFSET: u64 = 12;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// In-memory copy of the file allocation table plus the segment bitmap.
struct Fat {
    start: Vec<u32>,
    segments: Vec<u32>,
    bytes: Vec<u32>,
    in_use: Vec<bool>,
}

impl Fat {
    fn reserve(&mut self, start: usize, len: usize) -> usize {
        if self.in_use.len() < start + len {
            self.in_use.resize(start + len, false);
        }
        for i in start..start + len {
            if self.in_use[i] {
                for j in start..i {
                    self.in_use[j] = false;
                }
                return i - start;
            }
            self.in_use[i] = true;
        }
        len
    }

    fn release(&mut self, start: usize, len: usize) {
        for i in start..(start + len).min(self.in_use.len()) {
            self.in_use[i] = false;
        }
    }
}

/// Segmented container holding one compressed blob per entry.
///
/// Each entry has its own read/write lock, so different keys proceed in
/// parallel while the same key is serialized. The file closes itself once
/// idle for `timeout` and no entry is locked; a closed file must be reopened.
pub struct RegionFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
    fat: Mutex<Fat>,
    locks: Box<[RwLock<()>]>,
    locked: AtomicUsize,
    last_access: AtomicU64,
    timeout: Duration,
    segment_shift: u32,
    entries: usize,
}

struct Held<'a>(&'a AtomicUsize);

impl Drop for Held<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl RegionFile {
    pub fn open(path: impl AsRef<Path>, entries: usize, timeout: Duration) -> Result<Self, IoError> {
        Self::open_with_segments(path, DEFAULT_SEGMENT_SHIFT, entries, timeout)
    }

    pub fn open_with_segments(
        path: impl AsRef<Path>,
        segment_shift: u32,
        entries: usize,
        timeout: Duration,
    ) -> Result<Self, IoError> {
        if !SEGMENT_SHIFTS.contains(&segment_shift) {
            return Err(IoError::Corrupt(format!("segment shift {}", segment_shift)));
        }
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let header_len = FAT_OFFSET + 8 * entries as u64;
        if file.metadata()?.len() < header_len {
            let mut header = Vec::with_capacity(header_len as usize);
            header.extend_from_slice(&VERSION.to_be_bytes());
            header.extend_from_slice(&(segment_shift as i32).to_be_bytes());
            header.extend_from_slice(&(entries as i32).to_be_bytes());
            header.resize(header_len as usize, 0);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header)?;
        }
        let mut header = vec![0u8; header_len as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        let int_at = |off: usize| i32::from_be_bytes([header[off], header[off + 1], header[off + 2], header[off + 3]]);
        let version = int_at(0);
        if version != VERSION {
            return Err(IoError::Corrupt(format!("region file version {}", version)));
        }
        let shift = int_at(4);
        if shift < 0 || !SEGMENT_SHIFTS.contains(&(shift as u32)) {
            return Err(IoError::Corrupt(format!("segment shift {}", shift)));
        }
        let shift = shift as u32;
        let found = int_at(8) as usize;
        if found != entries {
            return Err(IoError::EntriesMismatch {
                expected: entries,
                found,
            });
        }
        let mut fat = Fat {
            start: vec![0; entries],
            segments: vec![0; entries],
            bytes: vec![0; entries],
            in_use: Vec::new(),
        };
        let file_len = file.metadata()?.len();
        let header_segments = Self::to_segments(shift, header_len as usize);
        fat.reserve(0, header_segments);
        for i in 0..entries {
            let off = FAT_OFFSET as usize + i * 8;
            let (start, bytes) = (int_at(off), int_at(off + 4));
            if bytes == 0 {
                continue;
            }
            // Every written entry lies wholly inside the file.
            if start < 0 || bytes < 0 || ((start as u64) << shift) + bytes as u64 > file_len {
                return Err(IoError::Corrupt(format!(
                    "entry {} start={} bytes={} file_len={}",
                    i, start, bytes, file_len
                )));
            }
            let (start, bytes) = (start as u32, bytes as u32);
            let segs = Self::to_segments(shift, bytes as usize) as u32;
            if fat.reserve(start as usize, segs as usize) != segs as usize {
                return Err(IoError::SegmentOverlap(i));
            }
            fat.start[i] = start;
            fat.bytes[i] = bytes;
            fat.segments[i] = segs;
        }
        log::debug!(target: "io", "open region file path={} entries={}", path.display(), entries);
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            fat: Mutex::new(fat),
            locks: (0..entries).map(|_| RwLock::new(())).collect(),
            locked: AtomicUsize::new(0),
            last_access: AtomicU64::new(now_ms()),
            timeout,
            segment_shift: shift,
            entries,
        })
    }

    fn to_segments(shift: u32, size: usize) -> usize {
        if size == 0 { 0 } else { ((size - 1) >> shift) + 1 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn enter(&self, i: usize) -> Result<Held<'_>, IoError> {
        if i >= self.entries {
            return Err(IoError::EntryOutOfRange(i));
        }
        self.last_access.store(now_ms(), Ordering::Relaxed);
        let mut n = self.locked.load(Ordering::Acquire);
        loop {
            if n == CLOSED {
                return Err(IoError::Closed);
            }
            match self
                .locked
                .compare_exchange_weak(n, n + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(Held(&self.locked)),
                Err(cur) => n = cur,
            }
        }
    }

    pub fn exists(&self, i: usize) -> Result<bool, IoError> {
        let _held = self.enter(i)?;
        let _guard = self.locks[i].read();
        Ok(self.fat.lock().bytes[i] != 0)
    }

    /// Inflated contents of entry `i`, or `None` if it was never written.
    pub fn read(&self, i: usize) -> Result<Option<Vec<u8>>, IoError> {
        let _held = self.enter(i)?;
        let _guard = self.locks[i].read();
        let (start, len) = {
            let fat = self.fat.lock();
            (fat.start[i] as u64, fat.bytes[i] as usize)
        };
        if len == 0 {
            return Ok(None);
        }
        let mut raw = vec![0u8; len];
        {
            let mut file = self.file.lock();
            let file = file.as_mut().ok_or(IoError::Closed)?;
            file.seek(SeekFrom::Start(start << self.segment_shift))?;
            file.read_exact(&mut raw)?;
        }
        let mut out = Vec::new();
        ZlibDecoder::new(&raw[..]).read_to_end(&mut out)?;
        Ok(Some(out))
    }

    /// Replaces entry `i` with the deflated `data`.
    pub fn write(&self, i: usize, data: &[u8]) -> Result<(), IoError> {
        let _held = self.enter(i)?;
        let _guard = self.locks[i].write();
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)?;
        let packed = enc.finish()?;
        let start = self.reserve_entry(i, packed.len());
        let mut file = self.file.lock();
        let file = file.as_mut().ok_or(IoError::Closed)?;
        file.seek(SeekFrom::Start(FAT_OFFSET + (i as u64) * 8))?;
        let mut fat_entry = [0u8; 8];
        fat_entry[..4].copy_from_slice(&(start as i32).to_be_bytes());
        fat_entry[4..].copy_from_slice(&(packed.len() as i32).to_be_bytes());
        file.write_all(&fat_entry)?;
        file.seek(SeekFrom::Start((start as u64) << self.segment_shift))?;
        file.write_all(&packed)?;
        Ok(())
    }

    fn reserve_entry(&self, i: usize, bytes: usize) -> u32 {
        let mut fat = self.fat.lock();
        let old_start = fat.start[i] as usize;
        let old_len = fat.segments[i] as usize;
        let new_len = Self::to_segments(self.segment_shift, bytes);
        if new_len <= old_len {
            fat.release(old_start + new_len, old_len - new_len);
        } else {
            let extra = new_len - old_len;
            let in_place = old_len > 0 && fat.reserve(old_start + old_len, extra) == extra;
            if !in_place {
                fat.release(old_start, old_len);
                let mut start = 0;
                loop {
                    let got = fat.reserve(start, new_len);
                    if got == new_len {
                        break;
                    }
                    start += got + 1;
                }
                fat.start[i] = start as u32;
            }
        }
        fat.segments[i] = new_len as u32;
        fat.bytes[i] = bytes as u32;
        fat.start[i]
    }

    pub fn is_timed_out(&self) -> bool {
        self.last_access.load(Ordering::Relaxed) + self.timeout.as_millis() as u64 <= now_ms()
    }

    pub fn is_closed(&self) -> bool {
        self.locked.load(Ordering::Acquire) == CLOSED
    }

    /// Closes only if no entry is currently locked.
    pub fn attempt_close(&self) -> bool {
        if self
            .locked
            .compare_exchange(0, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(f) = self.file.lock().take() {
            if let Err(e) = f.sync_all() {
                log::warn!(target: "io", "sync on close failed path={} err={}", self.path.display(), e);
            }
        }
        log::debug!(target: "io", "closed region file path={}", self.path.display());
        true
    }

    pub fn close_if_timed_out(&self) -> bool {
        self.is_timed_out() && self.attempt_close()
    }
}
