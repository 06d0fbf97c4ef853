use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

use super::config::{MaterialDef, MaterialsConfig};
use super::material::{Behavior, DynamicBehavior, Material};
use super::types::MaterialId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateName(String),
    DuplicateId(u16),
    LightOutOfRange { name: String, level: u8 },
    UnknownMaterial(u16),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateName(n) => write!(f, "material '{}' defined twice", n),
            RegistryError::DuplicateId(id) => write!(f, "material id {} assigned twice", id),
            RegistryError::LightOutOfRange { name, level } => {
                write!(f, "material '{}' light {} exceeds 15", name, level)
            }
            RegistryError::UnknownMaterial(id) => write!(f, "unknown material id {}", id),
        }
    }
}

impl Error for RegistryError {}

/// Material table keyed by id, with flat lookup tables for the hot paths
/// (lighting and height maps read these per block).
#[derive(Clone, Debug)]
pub struct MaterialRegistry {
    materials: Vec<Option<Material>>,
    by_name: HashMap<String, MaterialId>,
    light: Vec<u8>,
    opacity: Vec<u8>,
    occludes: Vec<bool>,
    surface: Vec<bool>,
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialRegistry {
    /// Registry holding only air at id 0.
    pub fn new() -> Self {
        let mut reg = Self {
            materials: Vec::new(),
            by_name: HashMap::new(),
            light: Vec::new(),
            opacity: Vec::new(),
            occludes: Vec::new(),
            surface: Vec::new(),
        };
        reg.insert(MaterialId::AIR, "air".to_string(), false, false, Vec::new());
        reg
    }

    /// Small built-in palette used by the default generators and tests.
    pub fn with_defaults() -> Self {
        let defs = vec![
            MaterialDef::named("stone").solid(),
            MaterialDef::named("dirt").solid(),
            MaterialDef::named("grass").solid(),
            MaterialDef::named("glass").opacity(0),
            MaterialDef::named("glowstone").solid().light(15),
            MaterialDef::named("water").opacity(2),
            MaterialDef::named("torch").light(14).surface(false),
        ];
        let mut reg = Self::new();
        for d in defs {
            // Built-in names are unique.
            let _ = reg.register(d);
        }
        reg
    }

    pub fn from_config(cfg: MaterialsConfig) -> Result<Self, RegistryError> {
        let mut reg = Self::new();
        for def in cfg.materials {
            if def.name == "air" {
                continue;
            }
            reg.register(def)?;
        }
        Ok(reg)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: MaterialsConfig = toml::from_str(toml_str)?;
        Ok(Self::from_config(cfg)?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn register(&mut self, def: MaterialDef) -> Result<MaterialId, RegistryError> {
        if self.by_name.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if def.light > 15 {
            return Err(RegistryError::LightOutOfRange {
                name: def.name,
                level: def.light,
            });
        }
        let id = match def.id {
            Some(id) => {
                if self.get(MaterialId(id)).is_some() {
                    return Err(RegistryError::DuplicateId(id));
                }
                MaterialId(id)
            }
            None => self.next_free_id(),
        };
        let mut behaviors = Vec::new();
        if def.light > 0 {
            behaviors.push(Behavior::LightSource { level: def.light });
        }
        if let Some(amount) = def.opacity {
            behaviors.push(Behavior::Opaque {
                amount: amount.min(15),
            });
        }
        let surface = def.surface.unwrap_or(true);
        self.insert(id, def.name, def.solid, surface, behaviors);
        Ok(id)
    }

    /// Attaches a scheduled/physics update hook to an existing material.
    pub fn attach_dynamic(
        &mut self,
        id: MaterialId,
        behavior: DynamicBehavior,
    ) -> Result<(), RegistryError> {
        let mat = self
            .materials
            .get_mut(id.0 as usize)
            .and_then(|m| m.as_mut())
            .ok_or(RegistryError::UnknownMaterial(id.0))?;
        mat.behaviors.retain(|b| !matches!(b, Behavior::Dynamic(_)));
        mat.behaviors.push(Behavior::Dynamic(behavior));
        Ok(())
    }

    fn next_free_id(&self) -> MaterialId {
        let free = self.materials.iter().position(|m| m.is_none());
        MaterialId(free.unwrap_or(self.materials.len()) as u16)
    }

    fn insert(
        &mut self,
        id: MaterialId,
        name: String,
        occludes: bool,
        surface: bool,
        behaviors: Vec<Behavior>,
    ) {
        let i = id.0 as usize;
        if self.materials.len() <= i {
            self.materials.resize(i + 1, None);
            self.light.resize(i + 1, 0);
            self.opacity.resize(i + 1, 0);
            self.occludes.resize(i + 1, false);
            self.surface.resize(i + 1, false);
        }
        let mat = Material {
            id,
            name: name.clone(),
            occludes,
            surface,
            behaviors,
        };
        self.light[i] = mat.light_level();
        self.opacity[i] = mat.opacity();
        self.occludes[i] = occludes;
        self.surface[i] = surface && !id.is_air();
        self.materials[i] = Some(mat);
        self.by_name.insert(name, id);
    }

    #[inline]
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize).and_then(|m| m.as_ref())
    }

    pub fn id_by_name(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter().filter_map(|m| m.as_ref())
    }

    #[inline]
    pub fn light_level(&self, id: u16) -> u8 {
        self.light.get(id as usize).copied().unwrap_or(0)
    }

    #[inline]
    pub fn opacity(&self, id: u16) -> u8 {
        self.opacity.get(id as usize).copied().unwrap_or(15)
    }

    /// Unknown ids occlude so stray data never leaks light.
    #[inline]
    pub fn occludes(&self, id: u16) -> bool {
        self.occludes.get(id as usize).copied().unwrap_or(true)
    }

    #[inline]
    pub fn is_surface(&self, id: u16) -> bool {
        self.surface.get(id as usize).copied().unwrap_or(false)
    }

    #[inline]
    pub fn dynamic(&self, id: u16) -> Option<DynamicBehavior> {
        self.get(MaterialId(id)).and_then(|m| m.dynamic())
    }

    /// Largest physics range declared by either material.
    pub fn physics_range(&self, a: u16, b: u16) -> u8 {
        let ra = self.dynamic(a).map(|d| d.range).unwrap_or(0);
        let rb = self.dynamic(b).map(|d| d.range).unwrap_or(0);
        ra.max(rb)
    }
}
