use crate::raytracer::SettingsError;
use crate::scene::World;
use nalgebra_glm::{Vec2, Vec4, vec2, vec4};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const MATERIAL_MAX_TEXTURES: usize = 4;

/// Id 0 is reserved for the built-in white texture.
pub static TEXTURE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub struct Texture {
    pub id: u64,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Texture {
    pub fn new(name: impl Into<String>, width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            id: TEXTURE_ID_COUNTER.fetch_add(1, Ordering::SeqCst),
            name: name.into(),
            width,
            height,
            rgba,
        }
    }

    pub fn white() -> Self {
        Self {
            id: 0,
            name: "white".into(),
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ShadingModel {
    Unlit,
    #[default]
    Lit,
    Toon,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum BlendMode {
    #[default]
    Opaque,
    Masked,
    Translucent,
    Additive,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum VertexColorMode {
    None,
    #[default]
    Modulate,
    TextureBlend,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum TevMode {
    Replace,
    #[default]
    Modulate,
    Decal,
    Add,
    SignedAdd,
    Subtract,
    Interpolate,
    /// Stage disabled.
    Pass,
}

#[derive(Clone)]
pub struct Material {
    pub name: String,
    pub shading_model: ShadingModel,
    pub blend_mode: BlendMode,
    pub vertex_color_mode: VertexColorMode,
    pub color: Vec4,
    pub fresnel_color: Vec4,
    pub fresnel_enabled: bool,
    pub fresnel_power: f32,
    pub toon_steps: u32,
    pub specular: f32,
    pub shininess: f32,
    pub opacity: f32,
    pub mask_cutoff: f32,
    pub emission: f32,
    pub apply_fog: bool,
    pub uv_offsets: [Vec2; 2],
    pub uv_scales: [Vec2; 2],
    pub textures: [Option<Rc<Texture>>; MATERIAL_MAX_TEXTURES],
    pub uv_maps: [u32; MATERIAL_MAX_TEXTURES],
    pub tev_modes: [TevMode; MATERIAL_MAX_TEXTURES],
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    pub fn with_texture(mut self, slot: usize, texture: Rc<Texture>) -> Self {
        if slot < MATERIAL_MAX_TEXTURES {
            self.textures[slot] = Some(texture);
        }
        self
    }

    /// Stage combine modes as the kernels run them. Stage 0 always replaces, so an untextured material samples
    /// white. Later stages without a texture are skipped.
    pub fn stage_modes(&self) -> [TevMode; MATERIAL_MAX_TEXTURES] {
        std::array::from_fn(|i| match (i, &self.textures[i]) {
            (0, _) => TevMode::Replace,
            (_, None) => TevMode::Pass,
            (_, Some(_)) => self.tev_modes[i],
        })
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".into(),
            shading_model: ShadingModel::default(),
            blend_mode: BlendMode::default(),
            vertex_color_mode: VertexColorMode::default(),
            color: vec4(1.0, 1.0, 1.0, 1.0),
            fresnel_color: vec4(1.0, 0.0, 0.0, 1.0),
            fresnel_enabled: false,
            fresnel_power: 1.0,
            toon_steps: 3,
            specular: 0.0,
            shininess: 32.0,
            opacity: 1.0,
            mask_cutoff: 0.5,
            emission: 0.0,
            apply_fog: true,
            uv_offsets: [Vec2::zeros(); 2],
            uv_scales: [vec2(1.0, 1.0); 2],
            textures: Default::default(),
            uv_maps: [0; MATERIAL_MAX_TEXTURES],
            tev_modes: [TevMode::default(); MATERIAL_MAX_TEXTURES],
        }
    }
}

/// Material properties glTF has no way to express, set per material name.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaterialOverride {
    pub shading_model: Option<ShadingModel>,
    pub blend_mode: Option<BlendMode>,
    pub vertex_color_mode: Option<VertexColorMode>,
    pub toon_steps: Option<u32>,
    pub opacity: Option<f32>,
    pub mask_cutoff: Option<f32>,
    pub emission: Option<f32>,
    pub fresnel_enabled: Option<bool>,
    pub fresnel_color: Option<[f32; 4]>,
    pub fresnel_power: Option<f32>,
    pub tev_modes: Option<[TevMode; MATERIAL_MAX_TEXTURES]>,
}

impl MaterialOverride {
    pub fn apply(&self, material: &mut Material) {
        if let Some(shading_model) = self.shading_model {
            material.shading_model = shading_model;
        }
        if let Some(blend_mode) = self.blend_mode {
            material.blend_mode = blend_mode;
        }
        if let Some(vertex_color_mode) = self.vertex_color_mode {
            material.vertex_color_mode = vertex_color_mode;
        }
        if let Some(toon_steps) = self.toon_steps {
            material.toon_steps = toon_steps;
        }
        if let Some(opacity) = self.opacity {
            material.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(mask_cutoff) = self.mask_cutoff {
            material.mask_cutoff = mask_cutoff;
        }
        if let Some(emission) = self.emission {
            material.emission = emission;
        }
        if let Some(fresnel_enabled) = self.fresnel_enabled {
            material.fresnel_enabled = fresnel_enabled;
        }
        if let Some(fresnel_color) = self.fresnel_color {
            material.fresnel_color = Vec4::from(fresnel_color);
        }
        if let Some(fresnel_power) = self.fresnel_power {
            material.fresnel_power = fresnel_power;
        }
        if let Some(tev_modes) = self.tev_modes {
            material.tev_modes = tev_modes;
        }
    }
}

/// The `[materials.<name>]` tables of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MaterialOverrides {
    materials: HashMap<String, MaterialOverride>,
}

impl MaterialOverrides {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read(path.display().to_string(), e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Gives every mesh node whose material has an entry its own overridden copy. Returns the number of nodes
    /// changed.
    pub fn apply(&self, world: &mut World) -> usize {
        if self.materials.is_empty() {
            return 0;
        }

        let mut changed = 0;

        for node in world.nodes_mut() {
            let Some(mesh) = node.as_mesh_mut() else {
                continue;
            };
            let Some(material) = &mesh.material else {
                continue;
            };
            let Some(entry) = self.materials.get(&material.name) else {
                continue;
            };

            let mut overridden = Material::clone(material);
            entry.apply(&mut overridden);
            mesh.material = Some(Rc::new(overridden));
            changed += 1;
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Indices, StaticMesh};
    use crate::raytracer::RayTraceSettings;
    use crate::scene::{MeshNode, Node};
    use nalgebra_glm::Mat4;

    const CONFIG: &str = r#"
max_bounces = 2

[materials.glass]
blend_mode = "translucent"
opacity = 0.25

[materials.sign]
shading_model = "toon"
toon_steps = 4
vertex_color_mode = "texture_blend"
tev_modes = ["replace", "decal", "signed_add", "pass"]
"#;

    fn mesh_with(world: &mut World, material: &Rc<Material>) -> crate::scene::NodeHandle {
        let mesh = Rc::new(StaticMesh::new("tri", vec![], Indices::U16(vec![]), false));
        world.add_mesh(material.name.clone(), Mat4::identity(), MeshNode::new(mesh).with_material(material.clone()))
    }

    fn material_of(world: &World, handle: crate::scene::NodeHandle) -> Rc<Material> {
        world
            .resolve(handle)
            .and_then(Node::as_mesh)
            .and_then(|m| m.material.clone())
            .unwrap()
    }

    #[test]
    fn stage_zero_always_replaces_and_empty_stages_pass() {
        let mut material = Material::new("stages").with_texture(2, Rc::new(Texture::new("t", 1, 1, vec![0; 4])));
        material.tev_modes = [TevMode::Add, TevMode::Add, TevMode::Subtract, TevMode::Add];

        assert_eq!(
            material.stage_modes(),
            [TevMode::Replace, TevMode::Pass, TevMode::Subtract, TevMode::Pass]
        );
    }

    #[test]
    fn overrides_replace_only_named_materials() {
        let overrides = MaterialOverrides::parse(CONFIG).unwrap();
        let glass = Rc::new(Material::new("glass"));
        let plain = Rc::new(Material::new("plain"));

        let mut world = World::new();
        let a = mesh_with(&mut world, &glass);
        let b = mesh_with(&mut world, &glass);
        let c = mesh_with(&mut world, &plain);

        assert_eq!(overrides.apply(&mut world), 2);

        for handle in [a, b] {
            let material = material_of(&world, handle);
            assert_eq!(material.blend_mode, BlendMode::Translucent);
            assert_eq!(material.opacity, 0.25);
            assert_eq!(material.shading_model, ShadingModel::Lit);
        }
        assert!(Rc::ptr_eq(&material_of(&world, c), &plain));
        assert_eq!(glass.blend_mode, BlendMode::Opaque);
    }

    #[test]
    fn override_enums_parse_from_snake_case() {
        let overrides = MaterialOverrides::parse(CONFIG).unwrap();
        let mut material = Material::new("sign");

        overrides.materials["sign"].apply(&mut material);

        assert_eq!(material.shading_model, ShadingModel::Toon);
        assert_eq!(material.toon_steps, 4);
        assert_eq!(material.vertex_color_mode, VertexColorMode::TextureBlend);
        assert_eq!(
            material.tev_modes,
            [TevMode::Replace, TevMode::Decal, TevMode::SignedAdd, TevMode::Pass]
        );
    }

    #[test]
    fn settings_ignore_the_materials_table() {
        let settings = RayTraceSettings::parse(CONFIG).unwrap();

        assert_eq!(settings.max_bounces, 2);
    }

    #[test]
    fn unknown_override_keys_are_rejected() {
        assert!(MaterialOverrides::parse("[materials.x]\nblend = \"additive\"\n").is_err());
        assert!(MaterialOverrides::parse("[materials.x]\nblend_mode = \"glowing\"\n").is_err());
    }
}
