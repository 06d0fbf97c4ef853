//! Material ids, material table, and block behaviors.
#![forbid(unsafe_code)]

pub mod config;
pub mod material;
pub mod registry;
pub mod types;

pub use material::{Behavior, BlockUpdate, DynamicBehavior, Material, UpdateFn, UpdateOutcome};
pub use registry::{MaterialRegistry, RegistryError};
pub use types::{Block, MaterialId};
