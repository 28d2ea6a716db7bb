use crate::material::{Material, VertexColorMode};
use crate::math::pack_color;
use crate::mesh::StaticMesh;
use crate::raytracer::backend::{Binding, ComputeBackend, Dispatch, InFlightDispatch, Kernel, binding};
use crate::raytracer::resource_pool::{PoolBuffer, ResourcePool};
use crate::raytracer::settings::RayTraceSettings;
use crate::raytracer::snapshot::{DirectLightLookup, SceneSnapshot, SnapshotBuilder};
use crate::raytracer::types::{DiffuseTriangle, LightBakeVertex, RayTraceUniforms, VertexLightData};
use crate::raytracer::{BAKE_WORKGROUP_SIZE, LIGHT_BAKE_SCALE, RayTraceError};
use crate::scene::{MeshMobility, Node, NodeHandle, World, WorldId};
use log::{debug, info, warn};
use nalgebra_glm::{Vec3, Vec4, vec4};
use std::rc::Rc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BakePhase {
    Direct,
    Indirect,
    Diffuse,
    Idle,
}

#[derive(Clone, Debug, Default)]
pub struct LightBakeResult {
    pub direct: Vec<Vec4>,
    pub indirect: Vec<Vec4>,
}

#[derive(Copy, Clone, Debug, Default)]
struct BakeCursor {
    /// Node whose iterations are running.
    current: Option<usize>,
    next: usize,
    /// Iterations of `current` already read back.
    iteration: u32,
}

/// Bakes per-vertex lighting for every static mesh of a world, one GPU dispatch at a time.
///
/// The node list is captured when the bake begins. Nodes are resolved again before every dispatch and readback,
/// so removing a node mid-bake only drops its result.
pub struct LightBaker {
    phase: BakePhase,
    nodes: Vec<NodeHandle>,
    results: Vec<LightBakeResult>,
    world: Option<WorldId>,
    cursor: BakeCursor,
    in_flight: Option<InFlightDispatch>,
    /// Work left behind by a cancelled bake that may still touch the bake buffers.
    draining: Option<InFlightDispatch>,
    total_diffuse_passes: u32,
}

impl LightBaker {
    pub fn new() -> Self {
        Self {
            phase: BakePhase::Idle,
            nodes: Vec::new(),
            results: Vec::new(),
            world: None,
            cursor: BakeCursor::default(),
            in_flight: None,
            draining: None,
            total_diffuse_passes: 0,
        }
    }

    pub fn phase(&self) -> BakePhase {
        self.phase
    }

    pub fn is_in_progress(&self) -> bool {
        self.phase != BakePhase::Idle
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Returns false when a bake is already running or nothing in the world can be baked.
    pub fn begin(&mut self, world: &mut World, settings: &RayTraceSettings) -> bool {
        if self.phase != BakePhase::Idle {
            return false;
        }

        let nodes = world
            .visible_nodes()
            .filter(|(_, node)| {
                node.as_mesh().is_some_and(|m| {
                    m.mesh.is_some() && m.bake_lighting && m.mobility == MeshMobility::Static
                })
            })
            .map(|(handle, _)| handle)
            .collect::<Vec<_>>();

        if nodes.is_empty() {
            info!("no static meshes to bake");
            return false;
        }

        for handle in &nodes {
            if let Some(mesh) = world.resolve_mut(*handle).and_then(Node::as_mesh_mut) {
                mesh.clear_instance_colors();
            }
        }

        info!("light bake started for {} meshes", nodes.len());

        self.results = vec![LightBakeResult::default(); nodes.len()];
        self.nodes = nodes;
        self.world = Some(world.id());
        self.cursor = BakeCursor::default();
        self.in_flight = None;
        self.total_diffuse_passes = settings.total_diffuse_passes();
        self.phase = BakePhase::Direct;

        true
    }

    /// Leaves meshes as they are. Preview colors from the direct phase stay until the next bake.
    pub fn cancel(&mut self) {
        if self.phase == BakePhase::Idle {
            return;
        }

        info!("light bake cancelled");

        self.draining = self.in_flight.take().or(self.draining);
        self.reset();
    }

    pub fn progress(&self, settings: &RayTraceSettings) -> f32 {
        if self.phase == BakePhase::Idle {
            return 1.0;
        }

        let n = self.nodes.len() as u64;
        let k = settings.bake_indirect_iterations as u64;
        let d = settings.total_diffuse_passes() as u64;
        let total = n + n * k + n * d;

        if total == 0 {
            return 1.0;
        }

        let node = self.cursor.current.unwrap_or(self.cursor.next) as u64;
        let iteration = self.cursor.iteration as u64;

        let done = match self.phase {
            BakePhase::Direct => node + iteration,
            BakePhase::Indirect => n + node * k + iteration,
            BakePhase::Diffuse => n + n * k + node * d + iteration,
            BakePhase::Idle => total,
        };

        (done as f32 / total as f32).clamp(0.0, 1.0)
    }

    /// Performs at most one readback and one dispatch. Never waits on the GPU.
    pub fn update<B: ComputeBackend>(
        &mut self,
        gpu: &mut B,
        pool: &mut ResourcePool<B>,
        world: &mut World,
        settings: &RayTraceSettings,
    ) -> Result<(), RayTraceError> {
        if self.phase == BakePhase::Idle {
            return Ok(());
        }

        if let Some(dispatch) = self.in_flight {
            if !dispatch.is_ready(gpu.frame_number()) {
                return Ok(());
            }

            self.in_flight = None;
            self.readback(gpu, pool, world, settings)?;
        }

        if let Some(dispatch) = self.draining {
            if !dispatch.is_ready(gpu.frame_number()) {
                return Ok(());
            }

            self.draining = None;
        }

        while self.phase != BakePhase::Idle {
            let iterations = self.iterations(settings);

            let index = match self.cursor.current {
                Some(index) => index,
                None if iterations == 0 || self.cursor.next >= self.nodes.len() => {
                    self.advance_phase(world);
                    continue;
                }
                None => {
                    let index = self.cursor.next;
                    self.cursor = BakeCursor {
                        current: Some(index),
                        next: index + 1,
                        iteration: 0,
                    };
                    index
                }
            };

            let Some(mesh) = self.resolve_mesh(world, index) else {
                warn!("skipping light bake of node {index}, it no longer resolves to a mesh");
                self.cursor.current = None;
                self.cursor.iteration = 0;
                continue;
            };

            match self.phase {
                BakePhase::Direct | BakePhase::Indirect => self.dispatch_trace(gpu, pool, world, settings, index, &mesh)?,
                BakePhase::Diffuse => self.dispatch_diffuse(gpu, pool, world, settings, index, &mesh)?,
                BakePhase::Idle => return Ok(()),
            }

            self.in_flight = Some(InFlightDispatch::new(gpu.frame_number()));
            return Ok(());
        }

        Ok(())
    }

    fn iterations(&self, settings: &RayTraceSettings) -> u32 {
        match self.phase {
            BakePhase::Direct => 1,
            BakePhase::Indirect => settings.bake_indirect_iterations,
            BakePhase::Diffuse => self.total_diffuse_passes,
            BakePhase::Idle => 0,
        }
    }

    fn advance_phase(&mut self, world: &mut World) {
        self.cursor = BakeCursor::default();

        self.phase = match self.phase {
            BakePhase::Direct => BakePhase::Indirect,
            BakePhase::Indirect => BakePhase::Diffuse,
            BakePhase::Diffuse => {
                self.finalize(world);
                self.reset();
                BakePhase::Idle
            }
            BakePhase::Idle => BakePhase::Idle,
        };

        info!("light bake entering {:?} phase", self.phase);
    }

    fn reset(&mut self) {
        self.phase = BakePhase::Idle;
        self.nodes.clear();
        self.results.clear();
        self.world = None;
        self.cursor = BakeCursor::default();
        self.in_flight = None;
    }

    /// The node must still exist in the baked world, hold a mesh and have vertices.
    fn resolve_mesh(&self, world: &World, index: usize) -> Option<Rc<StaticMesh>> {
        if self.world != Some(world.id()) {
            return None;
        }

        let handle = *self.nodes.get(index)?;
        let mesh = world.resolve(handle)?.as_mesh()?.mesh.clone()?;

        (mesh.num_vertices() > 0).then_some(mesh)
    }

    fn dispatch_trace<B: ComputeBackend>(
        &mut self,
        gpu: &mut B,
        pool: &mut ResourcePool<B>,
        world: &World,
        settings: &RayTraceSettings,
        index: usize,
        mesh: &StaticMesh,
    ) -> Result<(), RayTraceError> {
        let handle = self.nodes[index];
        let node = world.resolve(handle).ok_or(RayTraceError::IndexOutOfRange {
            what: "light bake node",
            index,
            len: self.nodes.len(),
        })?;
        let receive_shadows = node.as_mesh().is_some_and(|m| m.receive_shadows);

        let mut builder = SnapshotBuilder::new(world).with_bake_target(handle);
        if self.phase == BakePhase::Indirect {
            builder = builder.with_direct_light(DirectLightLookup {
                nodes: &self.nodes,
                results: &self.results,
            });
        }
        let snapshot = builder.build()?;

        pool.upload_scene(gpu, &snapshot)?;

        let kernel = match self.phase {
            BakePhase::Direct => {
                pool.upload(gpu, PoolBuffer::BakeVertices, &bake_vertices(node, mesh, None))?;
                Kernel::LightBakeDirect
            }
            _ => {
                // accumulation lives in the GPU buffer after the first iteration
                if self.cursor.iteration == 0 {
                    let light = Some((self.results[index].direct.as_slice(), &[][..]));
                    pool.upload(gpu, PoolBuffer::BakeVertices, &bake_vertices(node, mesh, light))?;
                }
                Kernel::LightBakeIndirect
            }
        };

        let num_vertices = mesh.num_vertices() as u32;
        let mut uniforms = bake_uniforms(&snapshot, settings, mesh);
        uniforms.accumulated_frames = self.cursor.iteration;
        uniforms.receive_shadows = receive_shadows as u32;

        debug!("{:?} bake of node {index}, iteration {}", self.phase, self.cursor.iteration);

        let slot = pool.write_uniforms(gpu, &uniforms)?;
        let mut bindings = pool.scene_bindings(slot)?;
        bindings.push((binding::TEXTURES, Binding::Textures(&snapshot.textures)));
        bindings.push((binding::BAKE_VERTICES, Binding::Storage(pool.buffer(PoolBuffer::BakeVertices)?)));

        gpu.dispatch(Dispatch {
            kernel,
            bindings,
            groups: [num_vertices.div_ceil(BAKE_WORKGROUP_SIZE), 1, 1],
        })
    }

    fn dispatch_diffuse<B: ComputeBackend>(
        &mut self,
        gpu: &mut B,
        pool: &mut ResourcePool<B>,
        world: &World,
        settings: &RayTraceSettings,
        index: usize,
        mesh: &StaticMesh,
    ) -> Result<(), RayTraceError> {
        let pass = self.cursor.iteration;
        let num_vertices = mesh.num_vertices() as u32;
        let triangles = mesh.triangles();

        if pass == 0 {
            let node = world.resolve(self.nodes[index]).ok_or(RayTraceError::IndexOutOfRange {
                what: "light bake node",
                index,
                len: self.nodes.len(),
            })?;
            let result = &self.results[index];
            let light = Some((result.direct.as_slice(), result.indirect.as_slice()));

            pool.upload(gpu, PoolBuffer::BakeVertices, &bake_vertices(node, mesh, light))?;

            let diffuse_triangles = triangles.iter().map(|t| DiffuseTriangle::new(*t)).collect::<Vec<_>>();
            pool.upload(gpu, PoolBuffer::DiffuseTriangles, &diffuse_triangles)?;
            pool.ensure_capacity(
                gpu,
                PoolBuffer::BakeAverage,
                (num_vertices as usize * size_of::<VertexLightData>()) as u64,
            )?;
        }

        let uniforms = RayTraceUniforms {
            num_bake_vertices: num_vertices,
            num_bake_triangles: triangles.len() as u32,
            diffuse_direct: (pass < settings.bake_diffuse_direct_passes) as u32,
            diffuse_indirect: (pass < settings.bake_diffuse_indirect_passes) as u32,
            bake_mesh_index: -1,
            ..Default::default()
        };

        debug!("diffuse pass {pass} of node {index}");

        let slot = pool.write_uniforms(gpu, &uniforms)?;
        let groups = [num_vertices.div_ceil(BAKE_WORKGROUP_SIZE), 1, 1];
        let vertices = pool.buffer(PoolBuffer::BakeVertices)?;
        let average = pool.buffer(PoolBuffer::BakeAverage)?;

        gpu.dispatch(Dispatch {
            kernel: Kernel::LightBakeAverage,
            bindings: vec![
                (binding::UNIFORMS, Binding::Uniform(pool.uniform(slot)?)),
                (binding::BAKE_VERTICES, Binding::Storage(vertices)),
                (binding::AVERAGE, Binding::Storage(average)),
            ],
            groups,
        })?;

        gpu.buffer_barrier(average)?;

        gpu.dispatch(Dispatch {
            kernel: Kernel::LightBakeDiffuse,
            bindings: vec![
                (binding::UNIFORMS, Binding::Uniform(pool.uniform(slot)?)),
                (binding::BAKE_VERTICES, Binding::Storage(vertices)),
                (binding::DIFFUSE_TRIANGLES, Binding::Storage(pool.buffer(PoolBuffer::DiffuseTriangles)?)),
                (binding::AVERAGE, Binding::Storage(average)),
            ],
            groups,
        })
    }

    fn readback<B: ComputeBackend>(
        &mut self,
        gpu: &mut B,
        pool: &mut ResourcePool<B>,
        world: &mut World,
        settings: &RayTraceSettings,
    ) -> Result<(), RayTraceError> {
        let Some(index) = self.cursor.current else {
            return Ok(());
        };

        let Some(mesh) = self.resolve_mesh(world, index) else {
            warn!("dropping light bake result of node {index}, it no longer resolves to a mesh");
            self.cursor.current = None;
            self.cursor.iteration = 0;
            return Ok(());
        };

        let vertices = pool.read::<LightBakeVertex>(gpu, PoolBuffer::BakeVertices, mesh.num_vertices())?;
        let result = &mut self.results[index];

        match self.phase {
            BakePhase::Direct => {
                result.direct = vertices.iter().map(LightBakeVertex::direct).collect();
                result.indirect = vec![Vec4::zeros(); vertices.len()];

                if let Some(mesh_node) = world.resolve_mut(self.nodes[index]).and_then(Node::as_mesh_mut) {
                    let colors = assign_instance_colors(&result.direct, &mesh, mesh_node.material.as_deref());
                    mesh_node.set_instance_colors(colors, false);
                }
            }
            BakePhase::Indirect => {
                result.indirect = vertices.iter().map(LightBakeVertex::indirect).collect();
            }
            BakePhase::Diffuse => {
                result.direct = vertices.iter().map(LightBakeVertex::direct).collect();
                result.indirect = vertices.iter().map(LightBakeVertex::indirect).collect();
            }
            BakePhase::Idle => {}
        }

        self.cursor.iteration += 1;

        if self.cursor.iteration >= self.iterations(settings) {
            self.cursor.current = None;
            self.cursor.iteration = 0;
        }

        Ok(())
    }

    fn finalize(&mut self, world: &mut World) {
        if self.world != Some(world.id()) {
            warn!("light bake finished in a different world, results discarded");
            return;
        }

        let mut baked = 0;

        for (handle, result) in self.nodes.iter().zip(self.results.iter()) {
            let Some(mesh_node) = world.resolve_mut(*handle).and_then(Node::as_mesh_mut) else {
                continue;
            };
            let Some(mesh) = mesh_node.mesh.clone() else {
                continue;
            };

            let n = mesh.num_vertices();
            if n != result.direct.len() || n != result.indirect.len() {
                debug!("skipping {}, vertex count does not match the bake result", mesh.name);
                continue;
            }

            let combined = result
                .direct
                .iter()
                .zip(result.indirect.iter())
                .map(|(d, i)| d + i)
                .collect::<Vec<_>>();

            let colors = assign_instance_colors(&combined, &mesh, mesh_node.material.as_deref());
            mesh_node.set_instance_colors(colors, true);
            baked += 1;
        }

        info!("light bake finished, {baked} of {} meshes baked", self.nodes.len());
    }
}

impl Default for LightBaker {
    fn default() -> Self {
        Self::new()
    }
}

/// World space bake input for every vertex of `mesh`, with optional (direct, indirect) light.
fn bake_vertices(node: &Node, mesh: &StaticMesh, light: Option<(&[Vec4], &[Vec4])>) -> Vec<LightBakeVertex> {
    let normal_transform = nalgebra_glm::inverse_transpose(nalgebra_glm::mat4_to_mat3(&node.transform));
    let zero = Vec4::zeros();

    mesh.vertices
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let p = &v.position;
            let position = (node.transform * vec4(p.x, p.y, p.z, 1.0)).xyz();
            let normal = (normal_transform * v.normal)
                .try_normalize(f32::EPSILON)
                .unwrap_or_else(Vec3::z);

            let (direct, indirect) = match light {
                Some((direct, indirect)) => (direct.get(i).unwrap_or(&zero), indirect.get(i).unwrap_or(&zero)),
                None => (&zero, &zero),
            };

            LightBakeVertex::new(&position, &normal, direct, indirect)
        })
        .collect()
}

fn bake_uniforms(snapshot: &SceneSnapshot, settings: &RayTraceSettings, mesh: &StaticMesh) -> RayTraceUniforms {
    let mut uniforms = RayTraceUniforms {
        num_triangles: snapshot.triangles.len() as u32,
        num_meshes: snapshot.meshes.len() as u32,
        num_lights: snapshot.lights.len() as u32,
        max_bounces: settings.bake_max_bounces,
        rays_per_thread: settings.bake_rays_per_vertex,
        num_bake_vertices: mesh.num_vertices() as u32,
        num_bake_triangles: mesh.num_triangles() as u32,
        shadow_bias: settings.bake_shadow_bias,
        bake_mesh_index: snapshot.bake_mesh_index.map_or(-1, |i| i as i32),
        ..Default::default()
    };

    uniforms.set_sky(&settings.sky_zenith(), &settings.sky_horizon(), &settings.ground_color());
    uniforms
}

/// Converts baked light to packed instance colors.
///
/// In texture blend mode the authored vertex RGB is kept and only alpha carries the light.
pub fn assign_instance_colors(colors: &[Vec4], mesh: &StaticMesh, material: Option<&Material>) -> Vec<u32> {
    let texture_blend = material.is_some_and(|m| m.vertex_color_mode == VertexColorMode::TextureBlend)
        && mesh.has_vertex_color
        && mesh.num_vertices() == colors.len();

    colors
        .iter()
        .enumerate()
        .map(|(v, color)| {
            let mut clamped = nalgebra_glm::clamp(&(color / LIGHT_BAKE_SCALE), 0.0, 1.0);

            if texture_blend {
                clamped.w = (clamped.x + clamped.y + clamped.z) / 3.0;
            }

            let packed = pack_color(&clamped);

            if texture_blend {
                (packed & 0xff00_0000) | (pack_color(&mesh.vertices[v].color) & 0x00ff_ffff)
            } else {
                packed
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::mesh::{Indices, Vertex};
    use crate::raytracer::testing::{Command, MockGpu};
    use crate::scene::{LightNode, MeshNode};
    use crate::shapes;
    use nalgebra_glm::Mat4;

    struct Harness {
        gpu: MockGpu,
        pool: ResourcePool<MockGpu>,
        baker: LightBaker,
        settings: RayTraceSettings,
    }

    impl Harness {
        fn new(settings: RayTraceSettings) -> Self {
            Self {
                gpu: MockGpu::new(),
                pool: ResourcePool::new(),
                baker: LightBaker::new(),
                settings,
            }
        }

        fn frame(&mut self, world: &mut World) {
            self.gpu.begin_frame().unwrap();
            self.pool.begin_frame(self.gpu.frame_number());
            self.baker
                .update(&mut self.gpu, &mut self.pool, world, &self.settings)
                .unwrap();
            self.gpu.end_frame().unwrap();
        }

        fn run(&mut self, world: &mut World) -> usize {
            for frame in 0..10_000 {
                if !self.baker.is_in_progress() {
                    return frame;
                }
                self.frame(world);
            }
            panic!("light bake did not finish");
        }
    }

    fn settings(k: u32, direct_passes: u32, indirect_passes: u32) -> RayTraceSettings {
        RayTraceSettings {
            bake_indirect_iterations: k,
            bake_diffuse_direct_passes: direct_passes,
            bake_diffuse_indirect_passes: indirect_passes,
            ..RayTraceSettings::new()
        }
    }

    fn white() -> Vec4 {
        vec4(1.0, 1.0, 1.0, 1.0)
    }

    fn lit_world(meshes: usize) -> (World, Vec<NodeHandle>) {
        let mut world = World::new();
        let plane = Rc::new(shapes::plane_grid(4.0, 9));

        let handles = (0..meshes)
            .map(|i| world.add_mesh(format!("plane {i}"), Mat4::identity(), MeshNode::new(plane.clone())))
            .collect();

        world.add_light(
            "lamp",
            nalgebra_glm::translation(&nalgebra_glm::vec3(0.0, 0.0, 2.0)),
            LightNode::point(white(), 1.0, 10.0),
        );

        (world, handles)
    }

    fn colors(world: &World, handle: NodeHandle) -> Vec<u32> {
        world
            .resolve(handle)
            .and_then(Node::as_mesh)
            .map(|m| m.instance_colors().to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn idle_update_does_nothing() {
        let mut h = Harness::new(RayTraceSettings::new());
        let (mut world, _) = lit_world(1);

        for _ in 0..5 {
            h.frame(&mut world);
        }

        assert_eq!(h.baker.phase(), BakePhase::Idle);
        assert_eq!(h.baker.progress(&h.settings), 1.0);
        assert!(h.gpu.state().commands.is_empty());
        assert!(h.gpu.state().created.is_empty());
    }

    #[test]
    fn begin_without_static_meshes_is_a_noop() {
        let mut h = Harness::new(RayTraceSettings::new());
        let mut world = World::new();

        let mut movable = MeshNode::new(Rc::new(shapes::cube(1.0)));
        movable.mobility = MeshMobility::Movable;
        world.add_mesh("movable", Mat4::identity(), movable);

        let mut unbaked = MeshNode::new(Rc::new(shapes::cube(1.0)));
        unbaked.bake_lighting = false;
        world.add_mesh("unbaked", Mat4::identity(), unbaked);

        assert!(!h.baker.begin(&mut world, &h.settings));
        assert!(!h.baker.is_in_progress());
    }

    #[test]
    fn begin_clears_previous_colors_and_rejects_reentry() {
        let mut h = Harness::new(RayTraceSettings::new());
        let (mut world, handles) = lit_world(1);

        if let Some(mesh) = world.resolve_mut(handles[0]).and_then(Node::as_mesh_mut) {
            mesh.set_instance_colors(vec![0xffff_ffff; 100], true);
        }

        assert!(h.baker.begin(&mut world, &h.settings));
        assert!(colors(&world, handles[0]).is_empty());
        assert!(!h.baker.begin(&mut world, &h.settings));
        assert_eq!(h.baker.nodes(), handles.as_slice());
    }

    #[test]
    fn single_mesh_bake_runs_every_pass() {
        let mut h = Harness::new(settings(4, 2, 1));
        let (mut world, handles) = lit_world(1);

        assert!(h.baker.begin(&mut world, &h.settings));
        h.run(&mut world);

        let state = h.gpu.state();
        assert_eq!(state.count(Kernel::LightBakeDirect), 1);
        assert_eq!(state.count(Kernel::LightBakeIndirect), 4);
        assert_eq!(state.count(Kernel::LightBakeAverage), 3);
        assert_eq!(state.count(Kernel::LightBakeDiffuse), 3);

        // direct = 1 light, indirect = mean(0.5, 1.0, 1.5, 2.0), alpha 1 + 1, all divided by the bake scale
        let baked = colors(&world, handles[0]);
        assert_eq!(baked.len(), 100);
        assert!(baked.iter().all(|c| *c == pack_color(&(vec4(2.25, 2.25, 2.25, 2.0) / LIGHT_BAKE_SCALE))));
        assert!(baked.iter().all(|c| *c == 0x808f_8f8f));
        assert!(world.resolve(handles[0]).and_then(Node::as_mesh).is_some_and(|m| m.has_baked_lighting()));
    }

    #[test]
    fn every_bake_kernel_knows_the_triangle_count() {
        let mut h = Harness::new(settings(2, 1, 1));
        let (mut world, handles) = lit_world(1);
        let triangles = world
            .resolve(handles[0])
            .and_then(Node::as_mesh)
            .and_then(|m| m.mesh.clone())
            .map(|m| m.num_triangles() as u32)
            .unwrap();

        h.baker.begin(&mut world, &h.settings);
        h.run(&mut world);

        let state = h.gpu.state();
        assert_eq!(state.uniforms.len(), 1 + 2 + 2 * 2);
        for (kernel, uniforms) in &state.uniforms {
            assert_eq!(uniforms.num_bake_triangles, triangles, "{kernel:?}");
            assert_eq!(uniforms.num_bake_vertices, 100, "{kernel:?}");
        }
    }

    #[test]
    fn bake_dispatch_groups_cover_vertices() {
        let mut h = Harness::new(settings(1, 0, 0));
        let (mut world, _) = lit_world(1);

        h.baker.begin(&mut world, &h.settings);
        h.run(&mut world);

        let groups = h
            .gpu
            .state()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch { groups, .. } => Some(*groups),
                _ => None,
            })
            .collect::<Vec<_>>();

        assert!(groups.iter().all(|g| *g == [4, 1, 1]));
    }

    #[test]
    fn diffuse_pass_orders_average_barrier_diffuse() {
        let mut h = Harness::new(settings(0, 1, 1));
        let (mut world, _) = lit_world(1);

        h.baker.begin(&mut world, &h.settings);
        h.run(&mut world);

        let state = h.gpu.state();
        let average_id = state
            .created
            .iter()
            .find(|(_, name, _)| *name == PoolBuffer::BakeAverage.name())
            .map(|(id, _, _)| *id)
            .unwrap();

        let diffuse_commands = state
            .commands
            .iter()
            .skip_while(|c| !matches!(c, Command::Dispatch { kernel: Kernel::LightBakeAverage, .. }))
            .collect::<Vec<_>>();

        assert_eq!(diffuse_commands.len(), 6);
        for triple in diffuse_commands.chunks(3) {
            assert!(matches!(triple[0], Command::Dispatch { kernel: Kernel::LightBakeAverage, .. }));
            assert_eq!(*triple[1], Command::Barrier { buffer: average_id });
            assert!(matches!(triple[2], Command::Dispatch { kernel: Kernel::LightBakeDiffuse, .. }));
        }
    }

    #[test]
    fn progress_is_monotonic() {
        let mut h = Harness::new(settings(3, 2, 2));
        let (mut world, _) = lit_world(3);

        h.baker.begin(&mut world, &h.settings);

        let mut last = h.baker.progress(&h.settings);
        assert_eq!(last, 0.0);

        while h.baker.is_in_progress() {
            h.frame(&mut world);
            let progress = h.baker.progress(&h.settings);
            assert!(progress >= last, "{progress} < {last}");
            last = progress;
        }

        assert_eq!(last, 1.0);
    }

    #[test]
    fn results_only_read_after_gpu_finished() {
        let mut h = Harness::new(settings(2, 1, 1));
        let (mut world, handles) = lit_world(2);

        h.baker.begin(&mut world, &h.settings);

        h.frame(&mut world);
        assert_eq!(h.gpu.state().count(Kernel::LightBakeDirect), 1);
        h.frame(&mut world);
        assert!(colors(&world, handles[0]).is_empty());
        assert_eq!(h.gpu.state().reads, 0);

        h.frame(&mut world);
        assert_eq!(h.gpu.state().reads, 1);
        assert_eq!(colors(&world, handles[0]).len(), 100);

        h.run(&mut world);

        let state = h.gpu.state();
        assert_eq!(state.stale_reads, 0);
        assert_eq!(state.host_write_hazards, 0);
        assert_eq!(state.freed_in_use, 0);
    }

    #[test]
    fn preview_colors_come_from_direct_light() {
        let mut h = Harness::new(settings(2, 1, 1));
        let (mut world, handles) = lit_world(1);

        h.baker.begin(&mut world, &h.settings);
        for _ in 0..3 {
            h.frame(&mut world);
        }

        let mesh = world.resolve(handles[0]).and_then(Node::as_mesh).unwrap();
        assert!(!mesh.has_baked_lighting());
        assert!(mesh.instance_colors().iter().all(|c| *c == pack_color(&vec4(0.25, 0.25, 0.25, 0.25))));
        assert_eq!(h.baker.phase(), BakePhase::Indirect);
    }

    #[test]
    fn deleted_mesh_is_skipped() {
        let mut h = Harness::new(settings(2, 1, 1));
        let (mut world, handles) = lit_world(3);

        h.baker.begin(&mut world, &h.settings);
        h.frame(&mut world);
        world.remove(handles[0]);
        h.run(&mut world);

        assert_eq!(colors(&world, handles[1]).len(), 100);
        assert_eq!(colors(&world, handles[2]).len(), 100);
        assert!(world.resolve(handles[0]).is_none());

        let state = h.gpu.state();
        assert_eq!(state.count(Kernel::LightBakeDirect), 3);
        assert_eq!(state.count(Kernel::LightBakeIndirect), 4);
        assert_eq!(state.stale_reads, 0);
    }

    #[test]
    fn node_removed_after_earlier_readback_keeps_finished_results() {
        let mut h = Harness::new(settings(2, 1, 1));
        let (mut world, handles) = lit_world(2);

        h.baker.begin(&mut world, &h.settings);
        for _ in 0..3 {
            h.frame(&mut world);
        }
        assert_eq!(colors(&world, handles[0]).len(), 100);

        world.remove(handles[1]);
        h.run(&mut world);

        let baked = world.resolve(handles[0]).and_then(Node::as_mesh).unwrap();
        assert_eq!(baked.instance_colors().len(), 100);
        assert!(baked.has_baked_lighting());
        assert!(world.resolve(handles[1]).is_none());

        let state = h.gpu.state();
        assert_eq!(state.count(Kernel::LightBakeIndirect), 2);
        assert_eq!(state.stale_reads, 0);
        assert_eq!(state.freed_in_use, 0);
    }

    #[test]
    fn mesh_asset_removed_mid_bake_does_not_stall() {
        let mut h = Harness::new(settings(1, 1, 1));
        let (mut world, handles) = lit_world(2);

        h.baker.begin(&mut world, &h.settings);
        h.frame(&mut world);

        if let Some(mesh) = world.resolve_mut(handles[1]).and_then(Node::as_mesh_mut) {
            mesh.mesh = None;
        }

        h.run(&mut world);

        assert_eq!(colors(&world, handles[0]).len(), 100);
        assert!(colors(&world, handles[1]).is_empty());
    }

    #[test]
    fn zero_indirect_iterations_skip_the_phase() {
        let mut h = Harness::new(settings(0, 1, 1));
        let (mut world, handles) = lit_world(1);

        h.baker.begin(&mut world, &h.settings);
        h.run(&mut world);

        assert_eq!(h.gpu.state().count(Kernel::LightBakeIndirect), 0);
        // direct only: (1 + 0, alpha 1 + 0) / 4
        let expected = pack_color(&vec4(0.25, 0.25, 0.25, 0.25));
        assert!(colors(&world, handles[0]).iter().all(|c| *c == expected));
    }

    #[test]
    fn cancel_leaves_meshes_untouched() {
        let mut h = Harness::new(settings(4, 2, 2));
        let (mut world, handles) = lit_world(2);

        h.baker.begin(&mut world, &h.settings);
        for _ in 0..4 {
            h.frame(&mut world);
        }
        let preview = colors(&world, handles[0]);

        h.baker.cancel();

        assert_eq!(h.baker.phase(), BakePhase::Idle);
        assert_eq!(h.baker.progress(&h.settings), 1.0);
        assert_eq!(colors(&world, handles[0]), preview);

        let dispatches = h.gpu.state().dispatches().len();
        h.frame(&mut world);
        assert_eq!(h.gpu.state().dispatches().len(), dispatches);
    }

    #[test]
    fn restart_after_cancel_waits_for_cancelled_work() {
        let mut h = Harness::new(settings(1, 1, 1));
        let (mut world, _) = lit_world(1);

        h.baker.begin(&mut world, &h.settings);
        h.frame(&mut world);
        h.baker.cancel();

        assert!(h.baker.begin(&mut world, &h.settings));
        h.frame(&mut world);
        assert_eq!(h.gpu.state().count(Kernel::LightBakeDirect), 1);

        h.run(&mut world);

        assert_eq!(h.gpu.state().count(Kernel::LightBakeDirect), 2);
        assert_eq!(h.gpu.state().host_write_hazards, 0);
    }

    #[test]
    fn other_world_results_are_discarded() {
        let mut h = Harness::new(settings(1, 1, 1));
        let (mut world, _) = lit_world(1);
        let (mut other, other_handles) = lit_world(1);

        h.baker.begin(&mut world, &h.settings);
        h.run(&mut other);

        assert!(colors(&other, other_handles[0]).is_empty());
    }

    #[test]
    fn texture_blend_replaces_alpha_only() {
        let vertices = (0..3)
            .map(|i| Vertex {
                color: vec4(0.1 * i as f32, 0.5, 1.0, 1.0),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        let mesh = StaticMesh::new("tri", vertices, Indices::U16(vec![0, 1, 2]), true);

        let mut material = Material::new("blend");
        material.vertex_color_mode = VertexColorMode::TextureBlend;

        let light = vec![vec4(4.0, 2.0, 0.0, 1.0); 3];
        let colors = assign_instance_colors(&light, &mesh, Some(&material));

        for (v, color) in colors.iter().enumerate() {
            assert_eq!(color & 0x00ff_ffff, pack_color(&mesh.vertices[v].color) & 0x00ff_ffff);
            assert_eq!(color >> 24, 128);
        }

        let modulate = assign_instance_colors(&light, &mesh, Some(&Material::default()));
        assert_eq!(modulate[0], pack_color(&vec4(1.0, 0.5, 0.0, 0.25)));
    }

    #[test]
    fn texture_blend_needs_vertex_colors() {
        let mesh = shapes::plane_grid(1.0, 1);
        let mut material = Material::new("blend");
        material.vertex_color_mode = VertexColorMode::TextureBlend;

        let colors = assign_instance_colors(&vec![vec4(4.0, 4.0, 4.0, 4.0); 4], &mesh, Some(&material));

        assert!(colors.iter().all(|c| *c == 0xffff_ffff));
    }
}
