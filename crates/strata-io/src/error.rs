use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum IoError {
    Io(io::Error),
    Closed,
    EntryOutOfRange(usize),
    EntriesMismatch { expected: usize, found: usize },
    SegmentOverlap(usize),
    Corrupt(String),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Io(e) => write!(f, "io: {}", e),
            IoError::Closed => write!(f, "region file closed"),
            IoError::EntryOutOfRange(i) => write!(f, "entry {} out of range", i),
            IoError::EntriesMismatch { expected, found } => {
                write!(f, "entry count mismatch: expected {} got {}", expected, found)
            }
            IoError::SegmentOverlap(i) => write!(f, "entry {} overlaps another entry", i),
            IoError::Corrupt(why) => write!(f, "corrupt record: {}", why),
        }
    }
}

impl Error for IoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IoError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        IoError::Io(e)
    }
}
