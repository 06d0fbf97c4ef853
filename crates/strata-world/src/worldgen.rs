use std::error::Error;
use std::sync::Arc;

use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};
use serde::Deserialize;
use strata_blocks::{Block, MaterialRegistry};

use crate::buffer::CuboidBuffer;
use crate::coords::{CHUNK_BITS, CHUNK_SIZE};
use crate::generator::{BiomeMap, TerrainGenerator};

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum GeneratorConfig {
    Flat(FlatParams),
    Noise(NoiseParams),
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig::Noise(NoiseParams::default())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FlatParams {
    /// Blocks with `y < height` are filled.
    #[serde(default = "default_flat_height")]
    pub height: i32,
    #[serde(default = "default_fill")]
    pub fill: String,
    #[serde(default)]
    pub top: Option<String>,
}
fn default_flat_height() -> i32 {
    64
}
fn default_fill() -> String {
    "stone".into()
}
impl Default for FlatParams {
    fn default() -> Self {
        Self {
            height: default_flat_height(),
            fill: default_fill(),
            top: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NoiseParams {
    #[serde(default = "default_base_height")]
    pub base_height: f32,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    #[serde(default = "default_frequency")]
    pub frequency: f32,
    #[serde(default = "default_octaves")]
    pub octaves: i32,
    #[serde(default = "default_fill")]
    pub fill: String,
    #[serde(default = "default_subsoil")]
    pub subsoil: String,
    #[serde(default = "default_top")]
    pub top: String,
    #[serde(default = "default_topsoil_depth")]
    pub topsoil_depth: i32,
}
fn default_base_height() -> f32 {
    64.0
}
fn default_amplitude() -> f32 {
    24.0
}
fn default_frequency() -> f32 {
    0.01
}
fn default_octaves() -> i32 {
    4
}
fn default_subsoil() -> String {
    "dirt".into()
}
fn default_top() -> String {
    "grass".into()
}
fn default_topsoil_depth() -> i32 {
    3
}
impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            base_height: default_base_height(),
            amplitude: default_amplitude(),
            frequency: default_frequency(),
            octaves: default_octaves(),
            fill: default_fill(),
            subsoil: default_subsoil(),
            top: default_top(),
            topsoil_depth: default_topsoil_depth(),
        }
    }
}

fn resolve(reg: &MaterialRegistry, name: &str) -> Result<Block, Box<dyn Error>> {
    reg.id_by_name(name)
        .map(Block::of)
        .ok_or_else(|| format!("generator references unknown material '{}'", name).into())
}

pub fn build_generator(
    cfg: &GeneratorConfig,
    seed: i32,
    reg: &MaterialRegistry,
) -> Result<Arc<dyn TerrainGenerator>, Box<dyn Error>> {
    let generator: Arc<dyn TerrainGenerator> = match cfg {
        GeneratorConfig::Flat(p) => {
            let top = match &p.top {
                Some(name) => Some(resolve(reg, name)?),
                None => None,
            };
            Arc::new(FlatGenerator {
                height: p.height,
                fill: resolve(reg, &p.fill)?,
                top,
            })
        }
        GeneratorConfig::Noise(p) => Arc::new(NoiseGenerator::new(
            seed,
            p,
            resolve(reg, &p.fill)?,
            resolve(reg, &p.subsoil)?,
            resolve(reg, &p.top)?,
        )),
    };
    log::info!(target: "gen", "terrain generator={} seed={}", generator.name(), seed);
    Ok(generator)
}

fn biome_maps(buf: &CuboidBuffer, id: u8) -> Vec<BiomeMap> {
    let w = (buf.sx / CHUNK_SIZE) * (buf.sz / CHUNK_SIZE);
    (0..w).map(|_| BiomeMap::uniform(id)).collect()
}

/// Layered flat terrain: `fill` below `height`, optional `top` on the last layer.
#[derive(Clone, Debug)]
pub struct FlatGenerator {
    pub height: i32,
    pub fill: Block,
    pub top: Option<Block>,
}

impl FlatGenerator {
    pub fn new(height: i32, fill: Block) -> Self {
        Self {
            height,
            fill,
            top: None,
        }
    }
}

impl TerrainGenerator for FlatGenerator {
    fn name(&self) -> &str {
        "flat"
    }

    fn generate(&self, buf: &mut CuboidBuffer) -> Vec<BiomeMap> {
        let by = buf.base.1;
        for y in 0..buf.sy {
            let wy = by + y as i32;
            if wy >= self.height {
                break;
            }
            let b = match self.top {
                Some(top) if wy == self.height - 1 => top,
                _ => self.fill,
            };
            let start = buf.idx(0, y, 0);
            let end = start + buf.sx * buf.sz;
            buf.blocks[start..end].fill(b);
        }
        biome_maps(buf, 0)
    }

    fn surface_heights(&self, _cx: i32, _cz: i32) -> Option<Vec<i32>> {
        Some(vec![self.height - 1; CHUNK_SIZE * CHUNK_SIZE])
    }
}

/// Heightfield terrain from fractal OpenSimplex2 noise.
pub struct NoiseGenerator {
    noise: FastNoiseLite,
    base_height: f32,
    amplitude: f32,
    topsoil_depth: i32,
    fill: Block,
    subsoil: Block,
    top: Block,
}

impl NoiseGenerator {
    pub fn new(seed: i32, p: &NoiseParams, fill: Block, subsoil: Block, top: Block) -> Self {
        let mut noise = FastNoiseLite::with_seed(seed);
        noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        noise.set_frequency(Some(p.frequency));
        noise.set_fractal_type(Some(FractalType::FBm));
        noise.set_fractal_octaves(Some(p.octaves));
        Self {
            noise,
            base_height: p.base_height,
            amplitude: p.amplitude,
            topsoil_depth: p.topsoil_depth.max(0),
            fill,
            subsoil,
            top,
        }
    }

    /// Topmost filled y at world column `(x, z)`.
    #[inline]
    pub fn height_at(&self, x: i32, z: i32) -> i32 {
        let n = self.noise.get_noise_2d(x as f32, z as f32);
        (self.base_height + n * self.amplitude).floor() as i32
    }
}

impl TerrainGenerator for NoiseGenerator {
    fn name(&self) -> &str {
        "noise"
    }

    fn generate(&self, buf: &mut CuboidBuffer) -> Vec<BiomeMap> {
        let (bx, by, bz) = buf.base;
        for z in 0..buf.sz {
            for x in 0..buf.sx {
                let h = self.height_at(bx + x as i32, bz + z as i32);
                for y in 0..buf.sy {
                    let wy = by + y as i32;
                    if wy > h {
                        break;
                    }
                    let b = if wy == h {
                        self.top
                    } else if wy > h - self.topsoil_depth {
                        self.subsoil
                    } else {
                        self.fill
                    };
                    buf.set_local(x, y, z, b);
                }
            }
        }
        biome_maps(buf, 1)
    }

    fn surface_heights(&self, cx: i32, cz: i32) -> Option<Vec<i32>> {
        let (x0, z0) = (cx << CHUNK_BITS, cz << CHUNK_BITS);
        let mut out = Vec::with_capacity(CHUNK_SIZE * CHUNK_SIZE);
        for z in 0..CHUNK_SIZE as i32 {
            for x in 0..CHUNK_SIZE as i32 {
                out.push(self.height_at(x0 + x, z0 + z));
            }
        }
        Some(out)
    }
}
