use crate::camera::PerspectiveCamera;
use crate::err::AppError;
use crate::material::{BlendMode, Material, ShadingModel, Texture};
use crate::math;
use crate::mesh::{Indices, StaticMesh, Vertex};
use crate::scene::{LightNode, MeshNode, World};
use gltf::khr_lights_punctual::Kind;
use gltf::material::AlphaMode;
use gltf::mesh::Mode;
use log::{info, warn};
use nalgebra::{Quaternion, UnitQuaternion};
use nalgebra_glm::{Mat4, Vec2, Vec3, Vec4, vec4};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// Range used for point lights that don't specify one.
pub const DEFAULT_POINT_LIGHT_RANGE: f32 = 20.0;

/// glTF's alpha cutoff when a masked material leaves it out.
pub const DEFAULT_MASK_CUTOFF: f32 = 0.5;

/// Loads the default scene of a glTF file. glTF is Y up, the world is Z up.
pub fn load_world(path: &Path) -> Result<World, AppError> {
    let (document, buffers, images) = gltf::import(path)?;

    let mut importer = Importer {
        buffers: &buffers,
        images: &images,
        meshes: HashMap::new(),
        materials: HashMap::new(),
        textures: HashMap::new(),
        world: World::new(),
    };

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AppError::Import(format!("{} contains no scene", path.display())))?;

    let convert = Mat4::from_euler_angles(std::f32::consts::FRAC_PI_2, 0.0, 0.0);

    for node in scene.nodes() {
        importer.visit(&node, &convert)?;
    }

    let world = importer.world;

    if world.is_empty() {
        warn!("{} has nothing that could be imported", path.display());
    }

    info!(
        "Loaded {} nodes from {} ({} meshes, {} materials)",
        world.len(),
        path.display(),
        importer.meshes.len(),
        importer.materials.len()
    );

    Ok(world)
}

struct Importer<'a> {
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    meshes: HashMap<(usize, usize), Rc<StaticMesh>>,
    materials: HashMap<Option<usize>, Rc<Material>>,
    textures: HashMap<usize, Rc<Texture>>,
    world: World,
}

impl Importer<'_> {
    fn visit(&mut self, node: &gltf::Node, parent: &Mat4) -> Result<(), AppError> {
        let (translation, rotation, scale) = node.transform().decomposed();
        let transform = parent * compose_trs(translation, rotation, scale);
        let name = node.name().map(str::to_owned).unwrap_or_else(|| format!("node {}", node.index()));

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != Mode::Triangles {
                    warn!("skipping primitive {} of `{name}`, only triangles are supported", primitive.index());
                    continue;
                }

                let static_mesh = self.mesh(&mesh, &primitive)?;
                if static_mesh.indices.is_empty() {
                    warn!("skipping primitive {} of `{name}`, it has no triangles", primitive.index());
                    continue;
                }

                let material = self.material(&primitive.material());

                self.world.add_mesh(
                    format!("{name} #{}", primitive.index()),
                    transform,
                    MeshNode::new(static_mesh).with_material(material),
                );
            }
        }

        if let Some(light) = node.light() {
            let color = vec4(light.color()[0], light.color()[1], light.color()[2], 1.0);

            let light_node = match light.kind() {
                Kind::Directional => LightNode::directional(color, light.intensity()),
                Kind::Point => {
                    LightNode::point(color, light.intensity(), light.range().unwrap_or(DEFAULT_POINT_LIGHT_RANGE))
                }
                Kind::Spot { .. } => {
                    warn!("spot light `{name}` imported as a point light");
                    LightNode::point(color, light.intensity(), light.range().unwrap_or(DEFAULT_POINT_LIGHT_RANGE))
                }
            };

            self.world.add_light(name.clone(), transform, light_node);
        }

        if let Some(camera) = node.camera() {
            match camera.projection() {
                gltf::camera::Projection::Perspective(perspective) if self.world.camera.is_none() => {
                    let position = (transform * vec4(0.0, 0.0, 0.0, 1.0)).xyz();
                    let forward = (transform * vec4(0.0, 0.0, -1.0, 0.0)).xyz();

                    let mut imported = PerspectiveCamera::looking_along(position, &forward);
                    imported.fov = math::rad_to_deg(perspective.yfov());

                    self.world.camera = Some(imported);
                }
                gltf::camera::Projection::Perspective(_) => {}
                gltf::camera::Projection::Orthographic(_) => {
                    warn!("orthographic camera `{name}` ignored");
                }
            }
        }

        for child in node.children() {
            self.visit(&child, &transform)?;
        }

        Ok(())
    }

    fn mesh(&mut self, mesh: &gltf::Mesh, primitive: &gltf::Primitive) -> Result<Rc<StaticMesh>, AppError> {
        let key = (mesh.index(), primitive.index());
        if let Some(existing) = self.meshes.get(&key) {
            return Ok(existing.clone());
        }

        let name = mesh.name().map(str::to_owned).unwrap_or_else(|| format!("mesh {}", mesh.index()));
        let imported = Rc::new(extract_primitive(&name, primitive, self.buffers)?);

        self.meshes.insert(key, imported.clone());

        Ok(imported)
    }

    fn material(&mut self, material: &gltf::Material) -> Rc<Material> {
        if let Some(existing) = self.materials.get(&material.index()) {
            return existing.clone();
        }

        let pbr = material.pbr_metallic_roughness();
        let name = material.name().unwrap_or("default").to_owned();

        let mut imported = Material::new(name).with_color(Vec4::from(pbr.base_color_factor()));
        imported.blend_mode = blend_mode(material.alpha_mode());
        imported.mask_cutoff = material.alpha_cutoff().unwrap_or(DEFAULT_MASK_CUTOFF);
        imported.emission = material.emissive_factor().into_iter().fold(0.0, f32::max);
        if material.unlit() {
            imported.shading_model = ShadingModel::Unlit;
        }

        if let Some(info) = pbr.base_color_texture() {
            match self.texture(&info.texture()) {
                Some(texture) => {
                    imported = imported.with_texture(0, texture);
                    imported.uv_maps[0] = info.tex_coord();
                }
                None => warn!("base color texture of `{}` has an unsupported format", imported.name),
            }
        }

        let imported = Rc::new(imported);
        self.materials.insert(material.index(), imported.clone());

        imported
    }

    fn texture(&mut self, texture: &gltf::Texture) -> Option<Rc<Texture>> {
        let source = texture.source().index();
        if let Some(existing) = self.textures.get(&source) {
            return Some(existing.clone());
        }

        let image = self.images.get(source)?;
        let rgba = to_rgba8(image)?;
        let name = texture
            .source()
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("image {source}"));

        let imported = Rc::new(Texture::new(name, image.width, image.height, rgba));
        self.textures.insert(source, imported.clone());

        Some(imported)
    }
}

fn extract_primitive(name: &str, primitive: &gltf::Primitive, buffers: &[gltf::buffer::Data]) -> Result<StaticMesh, AppError> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

    let positions = reader
        .read_positions()
        .ok_or_else(|| AppError::Import(format!("mesh `{name}` has no positions")))?
        .map(Vec3::from)
        .collect::<Vec<_>>();

    let len = positions.len();

    let normals = match reader.read_normals() {
        Some(normals) => normals.map(Vec3::from).collect(),
        None => vec![Vec3::z(); len],
    };
    let uv0 = match reader.read_tex_coords(0) {
        Some(uv) => uv.into_f32().map(Vec2::from).collect(),
        None => vec![Vec2::zeros(); len],
    };
    let uv1 = match reader.read_tex_coords(1) {
        Some(uv) => uv.into_f32().map(Vec2::from).collect(),
        None => uv0.clone(),
    };
    let colors = reader
        .read_colors(0)
        .map(|colors| colors.into_rgba_f32().map(Vec4::from).collect::<Vec<_>>());

    for (attribute, l) in [("normal", normals.len()), ("uv0", uv0.len()), ("uv1", uv1.len())] {
        if l != len {
            return Err(AppError::Import(format!(
                "{attribute} input data length mismatch in `{name}`, expected {len}, got {l}"
            )));
        }
    }
    if let Some(colors) = &colors {
        if colors.len() != len {
            return Err(AppError::Import(format!(
                "color input data length mismatch in `{name}`, expected {len}, got {}",
                colors.len()
            )));
        }
    }

    let vertices = (0..len)
        .map(|i| Vertex {
            position: positions[i],
            normal: normals[i],
            uv0: uv0[i],
            uv1: uv1[i],
            color: colors.as_ref().map_or(vec4(1.0, 1.0, 1.0, 1.0), |c| c[i]),
        })
        .collect::<Vec<_>>();

    let indices = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect::<Vec<_>>(),
        None => (0..len as u32).collect(),
    };

    if let Some(bad) = indices.iter().find(|&&i| i as usize >= len) {
        return Err(AppError::Import(format!(
            "index {bad} out of range in `{name}` with {len} vertices"
        )));
    }

    let indices = if len <= u16::MAX as usize + 1 {
        Indices::U16(indices.into_iter().map(|i| i as u16).collect())
    } else {
        Indices::U32(indices)
    };

    Ok(StaticMesh::new(name, vertices, indices, colors.is_some()))
}

fn blend_mode(alpha_mode: AlphaMode) -> BlendMode {
    match alpha_mode {
        AlphaMode::Opaque => BlendMode::Opaque,
        AlphaMode::Mask => BlendMode::Masked,
        AlphaMode::Blend => BlendMode::Translucent,
    }
}

/// Translation, `[x, y, z, w]` rotation quaternion and scale as one matrix.
fn compose_trs(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Mat4 {
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]));

    Mat4::new_translation(&Vec3::from(translation))
        * rotation.to_homogeneous()
        * Mat4::new_nonuniform_scaling(&Vec3::from(scale))
}

fn to_rgba8(image: &gltf::image::Data) -> Option<Vec<u8>> {
    use gltf::image::Format;

    let pixels = &image.pixels;

    let rgba = match image.format {
        Format::R8G8B8A8 => pixels.clone(),
        Format::R8G8B8 => pixels.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 255]).collect(),
        Format::R8G8 => pixels.chunks_exact(2).flat_map(|p| [p[0], p[0], p[0], p[1]]).collect(),
        Format::R8 => pixels.iter().flat_map(|&p| [p, p, p, 255]).collect(),
        _ => return None,
    };

    Some(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(format: gltf::image::Format, pixels: Vec<u8>) -> gltf::image::Data {
        gltf::image::Data {
            pixels,
            format,
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn trs_applies_scale_then_rotation_then_translation() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        // 90 degrees around Z
        let m = compose_trs([1.0, 2.0, 3.0], [0.0, 0.0, half, half], [2.0, 1.0, 1.0]);

        let p = m * vec4(1.0, 0.0, 0.0, 1.0);

        assert!((p.xyz() - Vec3::new(1.0, 4.0, 3.0)).norm() < 1e-5);
    }

    #[test]
    fn gltf_up_becomes_world_up() {
        let convert = Mat4::from_euler_angles(std::f32::consts::FRAC_PI_2, 0.0, 0.0);
        let up = convert * vec4(0.0, 1.0, 0.0, 0.0);

        assert!((up.xyz() - Vec3::z()).norm() < 1e-5);
    }

    #[test]
    fn alpha_modes_map_to_blend_modes() {
        assert_eq!(blend_mode(AlphaMode::Opaque), BlendMode::Opaque);
        assert_eq!(blend_mode(AlphaMode::Mask), BlendMode::Masked);
        assert_eq!(blend_mode(AlphaMode::Blend), BlendMode::Translucent);
    }

    #[test]
    fn rgb_gets_opaque_alpha() {
        let rgba = to_rgba8(&image(gltf::image::Format::R8G8B8, vec![10, 20, 30])).unwrap();

        assert_eq!(rgba, vec![10, 20, 30, 255]);
    }

    #[test]
    fn grayscale_alpha_expands() {
        let rgba = to_rgba8(&image(gltf::image::Format::R8G8, vec![7, 128])).unwrap();

        assert_eq!(rgba, vec![7, 7, 7, 128]);
    }

    #[test]
    fn float_images_are_unsupported() {
        assert!(to_rgba8(&image(gltf::image::Format::R32G32B32A32FLOAT, vec![0; 16])).is_none());
    }

    #[test]
    fn missing_file_is_an_import_error() {
        let result = load_world(Path::new("does/not/exist.gltf"));

        assert!(matches!(result, Err(AppError::Import(_))));
    }
}
