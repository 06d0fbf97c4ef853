//! Block-light and sky-light propagation across loaded chunks.
#![forbid(unsafe_code)]

mod engine;
mod init;

pub use engine::{LightModel, LightStats, LightingEngine};
pub use init::{init_chunk_lighting, prefill_light, refresh_face, seed_generated};
