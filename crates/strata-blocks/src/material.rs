use super::types::{Block, MaterialId};

/// Input handed to a dynamic material's update hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockUpdate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub block: Block,
    /// World time in milliseconds.
    pub time: u64,
    /// Payload attached when the update was queued.
    pub data: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Replacement block to write back, if any.
    pub set: Option<Block>,
    /// Absolute time for the next scheduled update.
    pub reschedule_at: Option<u64>,
}

impl UpdateOutcome {
    pub const NONE: UpdateOutcome = UpdateOutcome {
        set: None,
        reschedule_at: None,
    };
}

pub type UpdateFn = fn(&BlockUpdate) -> UpdateOutcome;

#[derive(Clone, Copy, Debug)]
pub struct DynamicBehavior {
    pub update: UpdateFn,
    /// Cube radius of neighbors that get a physics pass when this block changes.
    pub range: u8,
    /// Delay before the first scheduled update after placement.
    pub first_delay_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    LightSource { level: u8 },
    Opaque { amount: u8 },
    Dynamic(DynamicBehavior),
}

#[derive(Clone, Debug)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    /// Blocks light completely and forms a solid face.
    pub occludes: bool,
    /// Counts toward the column surface height.
    pub surface: bool,
    pub behaviors: Vec<Behavior>,
}

impl Material {
    pub fn light_level(&self) -> u8 {
        self.behaviors
            .iter()
            .find_map(|b| match b {
                Behavior::LightSource { level } => Some(*level),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn opacity(&self) -> u8 {
        let explicit = self.behaviors.iter().find_map(|b| match b {
            Behavior::Opaque { amount } => Some(*amount),
            _ => None,
        });
        match explicit {
            Some(a) => a,
            None if self.occludes => 15,
            None => 0,
        }
    }

    pub fn dynamic(&self) -> Option<DynamicBehavior> {
        self.behaviors.iter().find_map(|b| match b {
            Behavior::Dynamic(d) => Some(*d),
            _ => None,
        })
    }
}
