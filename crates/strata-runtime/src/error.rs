use std::error::Error;
use std::fmt;

use strata_chunk::ChunkError;

#[derive(Debug)]
pub enum RegionError {
    Chunk(ChunkError),
    Generation(String),
    /// Generator width that is not a power of two or exceeds a region.
    InvalidWidth(usize),
    /// A blocking generation request from a thread holding the snapshot lock.
    SnapshotLockHeld,
    SequenceMismatch { expected: i32, got: i32 },
    WorldGone,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::Chunk(e) => write!(f, "chunk: {}", e),
            RegionError::Generation(why) => write!(f, "generation failed: {}", why),
            RegionError::InvalidWidth(w) => {
                write!(f, "generator width {} must be a power of two no larger than a region", w)
            }
            RegionError::SnapshotLockHeld => {
                write!(f, "blocking generation requested while holding the snapshot lock")
            }
            RegionError::SequenceMismatch { expected, got } => {
                write!(f, "stage sequence {} outside 0..{}", got, expected)
            }
            RegionError::WorldGone => write!(f, "world dropped"),
        }
    }
}

impl Error for RegionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegionError::Chunk(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChunkError> for RegionError {
    fn from(e: ChunkError) -> Self {
        RegionError::Chunk(e)
    }
}
