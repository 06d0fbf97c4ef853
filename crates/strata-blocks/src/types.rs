use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialId(pub u16);

impl MaterialId {
    pub const AIR: MaterialId = MaterialId(0);

    #[inline]
    pub fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// One stored block: a material id and 16 bits of per-block data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Block {
    pub id: u16,
    pub data: u16,
}

impl Block {
    pub const AIR: Block = Block { id: 0, data: 0 };

    #[inline]
    pub const fn new(id: u16, data: u16) -> Self {
        Self { id, data }
    }

    #[inline]
    pub const fn of(material: MaterialId) -> Self {
        Self {
            id: material.0,
            data: 0,
        }
    }

    #[inline]
    pub fn material(self) -> MaterialId {
        MaterialId(self.id)
    }

    /// Packs as `(id << 16) | data`.
    #[inline]
    pub const fn pack(self) -> u32 {
        ((self.id as u32) << 16) | self.data as u32
    }

    #[inline]
    pub const fn unpack(packed: u32) -> Self {
        Self {
            id: (packed >> 16) as u16,
            data: packed as u16,
        }
    }
}

impl From<MaterialId> for Block {
    fn from(value: MaterialId) -> Self {
        Block::of(value)
    }
}
