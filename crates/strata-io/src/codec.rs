use strata_world::{CHUNK_SIZE, CHUNK_VOLUME, ChunkCoord};

use crate::error::IoError;

pub const CHUNK_VERSION: u8 = 3;
pub const COLUMN_VERSION: u8 = 1;

const NIBBLE_BYTES: usize = CHUNK_VOLUME / 2;
const COLUMN_AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Persisted form of one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRecord {
    pub coord: ChunkCoord,
    pub populated: bool,
    pub ids: Vec<u16>,
    pub data: Vec<u16>,
    pub sky_light: Vec<u8>,
    pub block_light: Vec<u8>,
}

impl ChunkRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(14 + CHUNK_VOLUME * 4 + NIBBLE_BYTES * 2);
        out.push(CHUNK_VERSION);
        out.extend_from_slice(&self.coord.cx.to_be_bytes());
        out.extend_from_slice(&self.coord.cy.to_be_bytes());
        out.extend_from_slice(&self.coord.cz.to_be_bytes());
        out.push(self.populated as u8);
        for v in &self.ids {
            out.extend_from_slice(&v.to_be_bytes());
        }
        for v in &self.data {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out.extend_from_slice(&self.sky_light);
        out.extend_from_slice(&self.block_light);
        out
    }

    /// Rejects unknown versions, truncated bodies, and records stored under
    /// the wrong key.
    pub fn decode(bytes: &[u8], expect: ChunkCoord) -> Result<Self, IoError> {
        let mut r = Reader { bytes, pos: 0 };
        let version = r.u8()?;
        if version != CHUNK_VERSION {
            return Err(IoError::Corrupt(format!("chunk version {}", version)));
        }
        let coord = ChunkCoord::new(r.i32()?, r.i32()?, r.i32()?);
        if coord != expect {
            return Err(IoError::Corrupt(format!(
                "chunk stored as {:?} read for {:?}",
                coord, expect
            )));
        }
        let populated = r.u8()? != 0;
        let ids = r.u16s(CHUNK_VOLUME)?;
        let data = r.u16s(CHUNK_VOLUME)?;
        let sky_light = r.take(NIBBLE_BYTES)?.to_vec();
        let block_light = r.take(NIBBLE_BYTES)?.to_vec();
        Ok(Self {
            coord,
            populated,
            ids,
            data,
            sky_light,
            block_light,
        })
    }
}

/// Persisted height map of one chunk column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnRecord {
    pub heights: Vec<i32>,
}

impl ColumnRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + COLUMN_AREA * 4);
        out.push(COLUMN_VERSION);
        for h in &self.heights {
            out.extend_from_slice(&h.to_be_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IoError> {
        let mut r = Reader { bytes, pos: 0 };
        let version = r.u8()?;
        if version != COLUMN_VERSION {
            return Err(IoError::Corrupt(format!("column version {}", version)));
        }
        let mut heights = Vec::with_capacity(COLUMN_AREA);
        for _ in 0..COLUMN_AREA {
            heights.push(r.i32()?);
        }
        Ok(Self { heights })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], IoError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(IoError::Corrupt(format!(
                "truncated at {} of {}",
                self.bytes.len(),
                end
            )));
        }
        let s = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, IoError> {
        Ok(self.take(1)?[0])
    }

    fn i32(&mut self) -> Result<i32, IoError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u16s(&mut self, n: usize) -> Result<Vec<u16>, IoError> {
        let b = self.take(n * 2)?;
        Ok(b.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
    }
}
