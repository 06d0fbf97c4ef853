//! Region container files, chunk and column codecs, and world storage layout.
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod region_file;
pub mod storage;

pub use codec::{CHUNK_VERSION, COLUMN_VERSION, ChunkRecord, ColumnRecord};
pub use error::IoError;
pub use region_file::RegionFile;
pub use storage::WorldStorage;
