use crate::material::{MATERIAL_MAX_TEXTURES, Material};
use bytemuck::{Pod, Zeroable};
use nalgebra_glm::{Mat4, Vec2, Vec3, Vec4};

pub const LIGHT_TYPE_POINT: u32 = 0;
pub const LIGHT_TYPE_DIRECTIONAL: u32 = 1;

fn vec2(v: &Vec2) -> [f32; 2] {
    [v.x, v.y]
}

fn vec3(v: &Vec3) -> [f32; 3] {
    [v.x, v.y, v.z]
}

fn vec4(v: &Vec4) -> [f32; 4] {
    [v.x, v.y, v.z, v.w]
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct PathTraceVertex {
    pub position: [f32; 3],
    pub pad0: u32,
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    pub normal: [f32; 3],
    pub pad1: u32,
    pub color: [f32; 4],
}

impl PathTraceVertex {
    pub fn new(position: &Vec3, normal: &Vec3, uv0: &Vec2, uv1: &Vec2, color: &Vec4) -> Self {
        Self {
            position: vec3(position),
            uv0: vec2(uv0),
            uv1: vec2(uv1),
            normal: vec3(normal),
            color: vec4(color),
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct RayTraceTriangle {
    pub vertices: [PathTraceVertex; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct MaterialData {
    pub uv_offset0: [f32; 2],
    pub uv_scale0: [f32; 2],
    pub uv_offset1: [f32; 2],
    pub uv_scale1: [f32; 2],
    pub color: [f32; 4],
    pub fresnel_color: [f32; 4],
    pub shading_model: u32,
    pub blend_mode: u32,
    pub toon_steps: u32,
    pub fresnel_power: f32,
    pub specular: f32,
    pub opacity: f32,
    pub mask_cutoff: f32,
    pub shininess: f32,
    pub fresnel_enabled: u32,
    pub vertex_color_mode: u32,
    pub apply_fog: u32,
    pub emission: f32,
    pub uv_maps: [u32; MATERIAL_MAX_TEXTURES],
    pub tev_modes: [u32; MATERIAL_MAX_TEXTURES],
}

impl From<&Material> for MaterialData {
    fn from(m: &Material) -> Self {
        Self {
            uv_offset0: vec2(&m.uv_offsets[0]),
            uv_scale0: vec2(&m.uv_scales[0]),
            uv_offset1: vec2(&m.uv_offsets[1]),
            uv_scale1: vec2(&m.uv_scales[1]),
            color: vec4(&m.color),
            fresnel_color: vec4(&m.fresnel_color),
            shading_model: m.shading_model as u32,
            blend_mode: m.blend_mode as u32,
            toon_steps: m.toon_steps,
            fresnel_power: m.fresnel_power,
            specular: m.specular,
            opacity: m.opacity,
            mask_cutoff: m.mask_cutoff,
            shininess: m.shininess,
            fresnel_enabled: m.fresnel_enabled as u32,
            vertex_color_mode: m.vertex_color_mode as u32,
            apply_fog: m.apply_fog as u32,
            emission: m.emission,
            uv_maps: m.uv_maps,
            tev_modes: m.stage_modes().map(|t| t as u32),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct RayTraceMesh {
    /// xyz center, w radius
    pub bounds: [f32; 4],
    pub start_triangle: u32,
    pub num_triangles: u32,
    pub cast_shadows: u32,
    pub has_baked_lighting: u32,
    pub textures: [u32; MATERIAL_MAX_TEXTURES],
    pub material: MaterialData,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct RayTraceLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 4],
    pub direction: [f32; 3],
    pub light_type: u32,
    pub cast_shadows: u32,
    pub pad: [u32; 3],
}

impl RayTraceLight {
    pub fn new(position: &Vec3, radius: f32, color: &Vec4, direction: &Vec3, light_type: u32, cast_shadows: bool) -> Self {
        Self {
            position: vec3(position),
            radius,
            color: vec4(color),
            direction: vec3(direction),
            light_type,
            cast_shadows: cast_shadows as u32,
            pad: [0; 3],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct LightBakeVertex {
    pub position: [f32; 3],
    pub pad0: u32,
    pub normal: [f32; 3],
    pub pad1: u32,
    pub direct: [f32; 4],
    pub indirect: [f32; 4],
}

impl LightBakeVertex {
    pub fn new(position: &Vec3, normal: &Vec3, direct: &Vec4, indirect: &Vec4) -> Self {
        Self {
            position: vec3(position),
            normal: vec3(normal),
            direct: vec4(direct),
            indirect: vec4(indirect),
            ..Default::default()
        }
    }

    pub fn direct(&self) -> Vec4 {
        Vec4::from(self.direct)
    }

    pub fn indirect(&self) -> Vec4 {
        Vec4::from(self.indirect)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct VertexLightData {
    pub direct: [f32; 4],
    pub indirect: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct DiffuseTriangle {
    pub indices: [u32; 3],
    pub pad: u32,
}

impl DiffuseTriangle {
    pub fn new(indices: [u32; 3]) -> Self {
        Self { indices, pad: 0 }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct RayTraceUniforms {
    pub num_triangles: u32,
    pub num_meshes: u32,
    pub num_lights: u32,
    pub max_bounces: u32,
    pub rays_per_thread: u32,
    pub accumulated_frames: u32,
    pub num_bake_vertices: u32,
    pub num_bake_triangles: u32,
    pub shadow_bias: f32,
    pub diffuse_direct: u32,
    pub diffuse_indirect: u32,
    /// Mesh being baked, -1 outside of a bake.
    pub bake_mesh_index: i32,
    pub receive_shadows: u32,
    pub pad0: [u32; 3],
    pub sky_zenith: [f32; 4],
    pub sky_horizon: [f32; 4],
    pub ground_color: [f32; 4],
    pub camera_position: [f32; 4],
    pub camera_to_world: [[f32; 4]; 4],
    pub fov_y: f32,
    pub aspect: f32,
    pub pad1: [f32; 2],
}

impl RayTraceUniforms {
    pub fn set_sky(&mut self, zenith: &Vec4, horizon: &Vec4, ground: &Vec4) {
        self.sky_zenith = vec4(zenith);
        self.sky_horizon = vec4(horizon);
        self.ground_color = vec4(ground);
    }

    pub fn set_camera(&mut self, position: &Vec3, camera_to_world: &Mat4, fov_y: f32, aspect: f32) {
        self.camera_position = [position.x, position.y, position.z, 1.0];
        self.camera_to_world = (*camera_to_world).into();
        self.fov_y = fov_y;
        self.aspect = aspect;
    }
}

const _: () = assert!(size_of::<PathTraceVertex>() == 64);
const _: () = assert!(size_of::<RayTraceTriangle>() == 192);
const _: () = assert!(size_of::<MaterialData>() == 144);
const _: () = assert!(size_of::<RayTraceMesh>() == 192);
const _: () = assert!(size_of::<RayTraceLight>() == 64);
const _: () = assert!(size_of::<LightBakeVertex>() == 64);
const _: () = assert!(size_of::<VertexLightData>() == 32);
const _: () = assert!(size_of::<DiffuseTriangle>() == 16);
const _: () = assert!(size_of::<RayTraceUniforms>() == 208);
