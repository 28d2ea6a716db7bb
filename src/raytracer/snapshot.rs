use crate::material::{MATERIAL_MAX_TEXTURES, Material, Texture};
use crate::math::unpack_color;
use crate::mesh::StaticMesh;
use crate::raytracer::light_bake::LightBakeResult;
use crate::raytracer::types::{
    LIGHT_TYPE_DIRECTIONAL, LIGHT_TYPE_POINT, MaterialData, PathTraceVertex, RayTraceLight, RayTraceMesh,
    RayTraceTriangle,
};
use crate::raytracer::{DIRECTIONAL_LIGHT_RADIUS, PATH_TRACE_MAX_TEXTURES, RayTraceError};
use crate::scene::{LightKind, LightNode, LightingDomain, MeshNode, Node, NodeHandle, World};
use nalgebra_glm::{Mat3, Mat4, Vec3, Vec4, vec3, vec4};
use std::collections::HashMap;
use std::rc::Rc;

/// How the vertex colors of a mesh record should be read by the tracing kernels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum BakedLighting {
    None = 0,
    /// Finished bake stored as packed instance colors, scaled down by `LIGHT_BAKE_SCALE`.
    Packed = 1,
    /// Unscaled direct light from the running bake.
    Linear = 2,
}

/// Flat GPU view of the visible world for one dispatch.
pub struct SceneSnapshot {
    pub triangles: Vec<RayTraceTriangle>,
    pub meshes: Vec<RayTraceMesh>,
    pub lights: Vec<RayTraceLight>,
    /// Slot 0 is always the white texture.
    pub textures: Vec<Rc<Texture>>,
    pub bake_mesh_index: Option<usize>,
}

/// Direct light results of the running bake, parallel slices.
#[derive(Copy, Clone)]
pub struct DirectLightLookup<'a> {
    pub nodes: &'a [NodeHandle],
    pub results: &'a [LightBakeResult],
}

impl<'a> DirectLightLookup<'a> {
    fn find(&self, handle: NodeHandle, num_vertices: usize) -> Option<&'a [Vec4]> {
        let index = self.nodes.iter().position(|h| *h == handle)?;
        let direct = &self.results.get(index)?.direct;

        (direct.len() == num_vertices).then_some(direct.as_slice())
    }
}

pub struct SnapshotBuilder<'a> {
    world: &'a World,
    bake_target: Option<NodeHandle>,
    direct_light: Option<DirectLightLookup<'a>>,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(world: &'a World) -> Self {
        Self {
            world,
            bake_target: None,
            direct_light: None,
        }
    }

    pub fn with_bake_target(mut self, handle: NodeHandle) -> Self {
        self.bake_target = Some(handle);
        self
    }

    pub fn with_direct_light(mut self, lookup: DirectLightLookup<'a>) -> Self {
        self.direct_light = Some(lookup);
        self
    }

    pub fn build(self) -> Result<SceneSnapshot, RayTraceError> {
        let mut snapshot = SceneSnapshot {
            triangles: Vec::new(),
            meshes: Vec::new(),
            lights: Vec::new(),
            textures: vec![Rc::new(Texture::white())],
            bake_mesh_index: None,
        };

        let mut texture_slots = HashMap::from([(0u64, 0u32)]);
        let default_material = Material::default();

        for (handle, node) in self.world.visible_nodes() {
            if let Some(mesh_node) = node.as_mesh() {
                let Some(mesh) = mesh_node.mesh.as_deref() else {
                    continue;
                };

                if mesh.num_triangles() == 0 {
                    continue;
                }

                if self.bake_target == Some(handle) {
                    snapshot.bake_mesh_index = Some(snapshot.meshes.len());
                }

                let material = mesh_node.material.as_deref().unwrap_or(&default_material);
                let textures = Self::resolve_textures(material, &mut snapshot.textures, &mut texture_slots)?;
                let direct = self.direct_light.and_then(|d| d.find(handle, mesh.num_vertices()));

                Self::push_mesh(&mut snapshot, node, mesh_node, mesh, material, textures, direct)?;
            } else if let Some(light) = node.as_light() {
                if light.domain == LightingDomain::Dynamic {
                    continue;
                }

                snapshot.lights.push(Self::light_record(node, light));
            }
        }

        Ok(snapshot)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_mesh(
        snapshot: &mut SceneSnapshot,
        node: &Node,
        mesh_node: &MeshNode,
        mesh: &StaticMesh,
        material: &Material,
        textures: [u32; MATERIAL_MAX_TEXTURES],
        direct: Option<&[Vec4]>,
    ) -> Result<(), RayTraceError> {
        let transform = &node.transform;
        let normal_transform = nalgebra_glm::inverse_transpose(nalgebra_glm::mat4_to_mat3(transform));

        let instance_colors = mesh_node.instance_colors();
        let instance_colors = (instance_colors.len() == mesh.num_vertices()).then_some(instance_colors);

        let baked = if direct.is_some() {
            BakedLighting::Linear
        } else if instance_colors.is_some() && mesh_node.has_baked_lighting() {
            BakedLighting::Packed
        } else {
            BakedLighting::None
        };

        let center = transform * vec4(mesh.bounds.center.x, mesh.bounds.center.y, mesh.bounds.center.z, 1.0);

        let start_triangle = snapshot.triangles.len();

        for indices in mesh.triangles() {
            let mut triangle = RayTraceTriangle::default();

            for (slot, &index) in triangle.vertices.iter_mut().zip(indices.iter()) {
                let index = index as usize;
                let vertex = mesh.vertices.get(index).ok_or(RayTraceError::IndexOutOfRange {
                    what: "vertex",
                    index,
                    len: mesh.num_vertices(),
                })?;

                let position = (transform * vec4(vertex.position.x, vertex.position.y, vertex.position.z, 1.0)).xyz();
                let normal = (normal_transform * vertex.normal)
                    .try_normalize(f32::EPSILON)
                    .unwrap_or_else(Vec3::z);

                let color = match (direct, instance_colors) {
                    (Some(direct), _) => direct[index],
                    (None, Some(colors)) => unpack_color(colors[index]),
                    (None, None) if mesh.has_vertex_color => vertex.color,
                    (None, None) => vec4(1.0, 1.0, 1.0, 1.0),
                };

                *slot = PathTraceVertex::new(&position, &normal, &vertex.uv0, &vertex.uv1, &color);
            }

            snapshot.triangles.push(triangle);
        }

        snapshot.meshes.push(RayTraceMesh {
            bounds: [center.x, center.y, center.z, mesh.bounds.radius * max_axis_scale(transform)],
            start_triangle: start_triangle as u32,
            num_triangles: (snapshot.triangles.len() - start_triangle) as u32,
            cast_shadows: mesh_node.cast_shadows as u32,
            has_baked_lighting: baked as u32,
            textures,
            material: MaterialData::from(material),
        });

        Ok(())
    }

    fn resolve_textures(
        material: &Material,
        textures: &mut Vec<Rc<Texture>>,
        slots: &mut HashMap<u64, u32>,
    ) -> Result<[u32; MATERIAL_MAX_TEXTURES], RayTraceError> {
        let mut resolved = [0u32; MATERIAL_MAX_TEXTURES];

        for (out, texture) in resolved.iter_mut().zip(material.textures.iter()) {
            let Some(texture) = texture else {
                continue;
            };

            *out = match slots.get(&texture.id) {
                Some(slot) => *slot,
                None => {
                    if textures.len() >= PATH_TRACE_MAX_TEXTURES {
                        return Err(RayTraceError::TooManyTextures {
                            limit: PATH_TRACE_MAX_TEXTURES,
                        });
                    }

                    let slot = textures.len() as u32;
                    textures.push(texture.clone());
                    slots.insert(texture.id, slot);
                    slot
                }
            };
        }

        Ok(resolved)
    }

    fn light_record(node: &Node, light: &LightNode) -> RayTraceLight {
        let position = node.world_position();

        match light.kind {
            LightKind::Point { radius } => RayTraceLight::new(
                &position,
                radius,
                &light.radiance(),
                &vec3(0.0, 0.0, -1.0),
                LIGHT_TYPE_POINT,
                light.cast_shadows,
            ),
            LightKind::Directional => RayTraceLight::new(
                &position,
                DIRECTIONAL_LIGHT_RADIUS,
                &light.radiance(),
                &node.world_direction(),
                LIGHT_TYPE_DIRECTIONAL,
                light.cast_shadows,
            ),
        }
    }
}

fn max_axis_scale(transform: &Mat4) -> f32 {
    let basis: Mat3 = nalgebra_glm::mat4_to_mat3(transform);

    basis.column_iter().map(|c| c.norm()).fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::math::pack_color;
    use crate::mesh::{Indices, StaticMesh, Vertex};
    use crate::scene::{LightNode, MeshNode};
    use crate::shapes;

    fn white() -> Vec4 {
        vec4(1.0, 1.0, 1.0, 1.0)
    }

    fn textured(count: usize) -> Rc<Material> {
        let mut material = Material::new("textured");
        for slot in 0..count.min(MATERIAL_MAX_TEXTURES) {
            material.textures[slot] = Some(Rc::new(Texture::new("t", 1, 1, vec![0; 4])));
        }
        Rc::new(material)
    }

    #[test]
    fn triangle_ranges_are_contiguous() {
        let mut world = World::new();
        world.add_mesh("cube", Mat4::identity(), MeshNode::new(Rc::new(shapes::cube(1.0))));
        world.add_mesh("plane", Mat4::identity(), MeshNode::new(Rc::new(shapes::plane_grid(1.0, 2))));

        let snapshot = SnapshotBuilder::new(&world).build().unwrap();

        assert_eq!(snapshot.meshes.len(), 2);
        assert_eq!(snapshot.meshes[0].start_triangle, 0);
        assert_eq!(snapshot.meshes[0].num_triangles, 12);
        assert_eq!(snapshot.meshes[1].start_triangle, 12);
        assert_eq!(snapshot.meshes[1].num_triangles, 8);
        assert_eq!(snapshot.triangles.len(), 20);
        assert_eq!(snapshot.bake_mesh_index, None);
    }

    #[test]
    fn empty_and_missing_meshes_are_skipped() {
        let mut world = World::new();
        let empty = Rc::new(StaticMesh::new("empty", vec![Vertex::default()], Indices::U16(vec![]), false));
        world.add_mesh("empty", Mat4::identity(), MeshNode::new(empty));

        let mut missing = MeshNode::new(Rc::new(shapes::cube(1.0)));
        missing.mesh = None;
        world.add_mesh("missing", Mat4::identity(), missing);

        let target = world.add_mesh("cube", Mat4::identity(), MeshNode::new(Rc::new(shapes::cube(1.0))));

        let snapshot = SnapshotBuilder::new(&world).with_bake_target(target).build().unwrap();

        assert_eq!(snapshot.meshes.len(), 1);
        assert_eq!(snapshot.bake_mesh_index, Some(0));
    }

    #[test]
    fn dynamic_lights_are_skipped() {
        let mut world = World::new();
        world.add_light("static", Mat4::identity(), LightNode::point(white(), 1.0, 5.0));
        world.add_light(
            "dynamic",
            Mat4::identity(),
            LightNode::point(white(), 1.0, 5.0).with_domain(LightingDomain::Dynamic),
        );
        world.add_light("sun", Mat4::identity(), LightNode::directional(white(), 2.0));

        let snapshot = SnapshotBuilder::new(&world).build().unwrap();

        assert_eq!(snapshot.lights.len(), 2);
        assert_eq!(snapshot.lights[0].light_type, LIGHT_TYPE_POINT);
        assert_eq!(snapshot.lights[0].radius, 5.0);
        assert_eq!(snapshot.lights[0].direction, [0.0, 0.0, -1.0]);
        assert_eq!(snapshot.lights[1].light_type, LIGHT_TYPE_DIRECTIONAL);
        assert_eq!(snapshot.lights[1].radius, DIRECTIONAL_LIGHT_RADIUS);
        assert_eq!(snapshot.lights[1].color, [2.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn textures_are_deduplicated_behind_white() {
        let mut world = World::new();
        let material = textured(2);
        let mesh = Rc::new(shapes::cube(1.0));
        world.add_mesh("a", Mat4::identity(), MeshNode::new(mesh.clone()).with_material(material.clone()));
        world.add_mesh("b", Mat4::identity(), MeshNode::new(mesh).with_material(material));

        let snapshot = SnapshotBuilder::new(&world).build().unwrap();

        assert_eq!(snapshot.textures.len(), 3);
        assert_eq!(snapshot.textures[0].id, 0);
        assert_eq!(snapshot.meshes[0].textures, [1, 2, 0, 0]);
        assert_eq!(snapshot.meshes[1].textures, [1, 2, 0, 0]);
    }

    #[test]
    fn texture_overflow_is_an_error() {
        let mut world = World::new();
        let mesh = Rc::new(shapes::cube(1.0));

        for _ in 0..8 {
            world.add_mesh("m", Mat4::identity(), MeshNode::new(mesh.clone()).with_material(textured(4)));
        }

        let result = SnapshotBuilder::new(&world).build();

        assert!(matches!(
            result,
            Err(RayTraceError::TooManyTextures {
                limit: PATH_TRACE_MAX_TEXTURES
            })
        ));
    }

    #[test]
    fn vertices_are_transformed_to_world_space() {
        let mut world = World::new();
        let transform = nalgebra_glm::translation(&vec3(0.0, 0.0, 5.0)) * nalgebra_glm::scaling(&vec3(2.0, 1.0, 1.0));
        world.add_mesh("plane", transform, MeshNode::new(Rc::new(shapes::plane_grid(2.0, 1))));

        let snapshot = SnapshotBuilder::new(&world).build().unwrap();
        let v = snapshot.triangles[0].vertices[0];

        assert_eq!(v.position, [-2.0, -1.0, 5.0]);
        assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        assert_eq!(snapshot.meshes[0].bounds[2], 5.0);
        assert!((snapshot.meshes[0].bounds[3] - 2.0 * 2.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn scaled_normals_stay_unit_length() {
        let mut world = World::new();
        let transform = nalgebra_glm::scaling(&vec3(4.0, 1.0, 0.5));
        world.add_mesh("sphere", transform, MeshNode::new(Rc::new(shapes::uv_sphere(1.0, 6, 4))));

        let snapshot = SnapshotBuilder::new(&world).build().unwrap();

        for triangle in &snapshot.triangles {
            for v in &triangle.vertices {
                assert!((Vec3::from(v.normal).norm() - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn direct_results_take_priority_over_instance_colors() {
        let mut world = World::new();
        let mesh = Rc::new(shapes::plane_grid(1.0, 1));
        let count = mesh.num_vertices();

        let mut node = MeshNode::new(mesh.clone());
        node.set_instance_colors(vec![pack_color(&vec4(1.0, 0.0, 0.0, 1.0)); count], true);
        let handle = world.add_mesh("plane", Mat4::identity(), node);

        let results = [LightBakeResult {
            direct: vec![vec4(3.0, 3.0, 3.0, 1.0); count],
            indirect: vec![],
        }];
        let nodes = [handle];

        let with_direct = SnapshotBuilder::new(&world)
            .with_direct_light(DirectLightLookup {
                nodes: &nodes,
                results: &results,
            })
            .build()
            .unwrap();

        assert_eq!(with_direct.triangles[0].vertices[0].color, [3.0, 3.0, 3.0, 1.0]);
        assert_eq!(with_direct.meshes[0].has_baked_lighting, BakedLighting::Linear as u32);

        let without = SnapshotBuilder::new(&world).build().unwrap();

        assert_eq!(without.triangles[0].vertices[0].color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(without.meshes[0].has_baked_lighting, BakedLighting::Packed as u32);
    }

    #[test]
    fn mismatched_colors_fall_back_to_vertex_color() {
        let mut world = World::new();
        let vertices = vec![
            Vertex {
                color: vec4(0.0, 0.5, 0.0, 1.0),
                ..Default::default()
            };
            3
        ];
        let mesh = Rc::new(StaticMesh::new("tri", vertices, Indices::U16(vec![0, 1, 2]), true));

        let mut node = MeshNode::new(mesh);
        node.set_instance_colors(vec![0xffff_ffff; 2], true);
        world.add_mesh("tri", Mat4::identity(), node);

        let snapshot = SnapshotBuilder::new(&world).build().unwrap();

        assert_eq!(snapshot.triangles[0].vertices[1].color, [0.0, 0.5, 0.0, 1.0]);
        assert_eq!(snapshot.meshes[0].has_baked_lighting, BakedLighting::None as u32);
    }
}
