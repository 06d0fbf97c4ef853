use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use strata_blocks::MaterialRegistry;
use strata_world::WorldConfig;

/// Top-level server settings. Paths are resolved relative to the config file.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub world_config: Option<PathBuf>,
    #[serde(default)]
    pub materials: Option<PathBuf>,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Number of ticks to run; zero runs until the process is stopped.
    #[serde(default)]
    pub ticks: u64,
    #[serde(default = "default_region_workers")]
    pub region_workers: usize,
    /// Chunk radius generated around the origin before the first tick.
    #[serde(default = "default_spawn_radius")]
    pub spawn_radius: i32,
    #[serde(default)]
    pub world: Option<WorldConfig>,
}

fn default_tick_ms() -> u64 {
    50
}
fn default_region_workers() -> usize {
    4
}
fn default_spawn_radius() -> i32 {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            world_config: None,
            materials: None,
            tick_ms: default_tick_ms(),
            ticks: 0,
            region_workers: default_region_workers(),
            spawn_radius: default_spawn_radius(),
            world: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: ServerConfig = toml::from_str(toml_str)?;
        Ok(cfg)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)?;
        let mut cfg = Self::from_toml_str(&s)?;
        if let Some(base) = path.parent() {
            cfg.world_config = cfg.world_config.map(|p| base.join(p));
            cfg.materials = cfg.materials.map(|p| base.join(p));
        }
        Ok(cfg)
    }

    /// Inline `[world]` wins over `world_config`; neither means defaults.
    pub fn world_config(&self) -> Result<WorldConfig, Box<dyn Error>> {
        match (&self.world, &self.world_config) {
            (Some(w), _) => Ok(w.clone()),
            (None, Some(path)) => WorldConfig::load_from_path(path),
            (None, None) => Ok(WorldConfig::default()),
        }
    }

    pub fn registry(&self) -> Result<MaterialRegistry, Box<dyn Error>> {
        match &self.materials {
            Some(path) => MaterialRegistry::load_from_path(path),
            None => Ok(MaterialRegistry::with_defaults()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_world::GeneratorConfig;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.tick_ms, 50);
        assert_eq!(cfg.ticks, 0);
        assert_eq!(cfg.spawn_radius, 2);
        let world = cfg.world_config().unwrap();
        assert_eq!(world.generator_width, 4);
        assert_eq!(world.limits.reap_delay_ticks, 200);
    }

    #[test]
    fn inline_world_section_is_used() {
        let cfg = ServerConfig::from_toml_str(
            r#"
tick_ms = 20
ticks = 100

[world]
seed = 42
generator_width = 2

[world.generator]
mode = "flat"

[world.limits]
autosave_ticks = 0
"#,
        )
        .unwrap();
        assert_eq!(cfg.tick_ms, 20);
        let world = cfg.world_config().unwrap();
        assert_eq!(world.seed, 42);
        assert_eq!(world.generator_width, 2);
        assert_eq!(world.limits.autosave_ticks, 0);
        assert_eq!(world.limits.reap_per_tick, 10);
        assert!(matches!(world.generator, GeneratorConfig::Flat(_)));
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("world.toml"), "seed = 7\n").unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "world_config = \"world.toml\"\n").unwrap();
        let cfg = ServerConfig::load_from_path(&path).unwrap();
        assert_eq!(cfg.world_config.as_deref(), Some(dir.path().join("world.toml").as_path()));
        assert_eq!(cfg.world_config().unwrap().seed, 7);
        assert!(cfg.registry().unwrap().id_by_name("stone").is_some());
    }
}
