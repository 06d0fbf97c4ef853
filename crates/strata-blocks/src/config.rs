use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MaterialsConfig {
    #[serde(default)]
    pub materials: Vec<MaterialDef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MaterialDef {
    pub name: String,
    #[serde(default)]
    pub id: Option<u16>,
    #[serde(default)]
    pub solid: bool,
    #[serde(default)]
    pub surface: Option<bool>,
    #[serde(default)]
    pub light: u8,
    #[serde(default)]
    pub opacity: Option<u8>,
}

impl MaterialDef {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: None,
            solid: false,
            surface: None,
            light: 0,
            opacity: None,
        }
    }

    pub fn solid(mut self) -> Self {
        self.solid = true;
        self
    }

    pub fn light(mut self, level: u8) -> Self {
        self.light = level;
        self
    }

    pub fn opacity(mut self, amount: u8) -> Self {
        self.opacity = Some(amount);
        self
    }

    pub fn surface(mut self, surface: bool) -> Self {
        self.surface = Some(surface);
        self
    }
}
