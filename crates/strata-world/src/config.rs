use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::worldgen::GeneratorConfig;

#[derive(Clone, Debug, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_world_dir")]
    pub world_dir: PathBuf,
    #[serde(default)]
    pub seed: i32,
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Chunk columns generated together; a power of two no larger than a region.
    #[serde(default = "default_generator_width")]
    pub generator_width: usize,
    #[serde(default = "default_generation_workers")]
    pub generation_workers: usize,
    /// Generate the four lateral neighbor ranges in the background once a
    /// requested range is done.
    #[serde(default = "default_touch_neighbors")]
    pub touch_neighbors: bool,
    #[serde(default)]
    pub limits: TickLimits,
    #[serde(default = "default_dirty_capacity")]
    pub dirty_capacity: usize,
    #[serde(default = "default_region_file_timeout_ms")]
    pub region_file_timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TickLimits {
    #[serde(default = "default_reap_per_tick")]
    pub reap_per_tick: usize,
    #[serde(default = "default_populate_per_tick")]
    pub populate_per_tick: usize,
    #[serde(default = "default_unload_per_tick")]
    pub unload_per_tick: usize,
    /// Ticks a chunk must go unobserved before it may be reaped.
    #[serde(default = "default_reap_delay_ticks")]
    pub reap_delay_ticks: u64,
    #[serde(default = "default_autosave_ticks")]
    pub autosave_ticks: u64,
    #[serde(default = "default_light_batches_per_tick")]
    pub light_batches_per_tick: usize,
}

fn default_world_dir() -> PathBuf {
    PathBuf::from("world")
}
fn default_generator_width() -> usize {
    4
}
fn default_generation_workers() -> usize {
    2
}
fn default_touch_neighbors() -> bool {
    true
}
fn default_dirty_capacity() -> usize {
    10
}
fn default_region_file_timeout_ms() -> u64 {
    120_000
}
fn default_reap_per_tick() -> usize {
    10
}
fn default_populate_per_tick() -> usize {
    20
}
fn default_unload_per_tick() -> usize {
    10
}
fn default_reap_delay_ticks() -> u64 {
    200
}
fn default_autosave_ticks() -> u64 {
    600
}
fn default_light_batches_per_tick() -> usize {
    200
}

impl Default for TickLimits {
    fn default() -> Self {
        Self {
            reap_per_tick: default_reap_per_tick(),
            populate_per_tick: default_populate_per_tick(),
            unload_per_tick: default_unload_per_tick(),
            reap_delay_ticks: default_reap_delay_ticks(),
            autosave_ticks: default_autosave_ticks(),
            light_batches_per_tick: default_light_batches_per_tick(),
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            world_dir: default_world_dir(),
            seed: 0,
            generator: GeneratorConfig::default(),
            generator_width: default_generator_width(),
            generation_workers: default_generation_workers(),
            touch_neighbors: default_touch_neighbors(),
            limits: TickLimits::default(),
            dirty_capacity: default_dirty_capacity(),
            region_file_timeout_ms: default_region_file_timeout_ms(),
        }
    }
}

impl WorldConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: WorldConfig = toml::from_str(toml_str)?;
        Ok(cfg)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}
