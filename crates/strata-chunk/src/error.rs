use std::error::Error;
use std::fmt;

use strata_world::{ChunkCoord, StageViolation};

/// Structural violations. Every variant signals a caller or scheduler bug
/// and must be propagated, never swallowed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkError {
    /// Access to a chunk after it was unloaded.
    StaleChunk(ChunkCoord),
    DoubleUnload(ChunkCoord),
    Stage(StageViolation),
    OutOfBounds { x: i32, y: i32, z: i32 },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::StaleChunk(c) => write!(f, "stale access to unloaded chunk {:?}", c),
            ChunkError::DoubleUnload(c) => write!(f, "chunk {:?} unloaded twice", c),
            ChunkError::Stage(v) => write!(f, "stage violation: {}", v),
            ChunkError::OutOfBounds { x, y, z } => {
                write!(f, "block ({}, {}, {}) is outside the chunk", x, y, z)
            }
        }
    }
}

impl Error for ChunkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChunkError::Stage(v) => Some(v),
            _ => None,
        }
    }
}

impl From<StageViolation> for ChunkError {
    fn from(v: StageViolation) -> Self {
        ChunkError::Stage(v)
    }
}
