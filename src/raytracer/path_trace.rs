use crate::camera::PerspectiveCamera;
use crate::raytracer::backend::{Binding, ComputeBackend, Dispatch, Kernel, binding};
use crate::raytracer::resource_pool::ResourcePool;
use crate::raytracer::settings::RayTraceSettings;
use crate::raytracer::snapshot::SnapshotBuilder;
use crate::raytracer::types::RayTraceUniforms;
use crate::raytracer::{CAMERA_EPSILON, PATH_TRACE_SHADOW_BIAS, PATH_TRACE_WORKGROUP_SIZE, RayTraceError};
use crate::scene::World;
use log::debug;
use nalgebra_glm::Vec3;

/// Progressive path tracing into the pool's output image.
pub struct PathTracer {
    accumulated_frames: u32,
    last_camera: Option<(Vec3, Vec3)>,
}

impl PathTracer {
    pub fn new() -> Self {
        Self {
            accumulated_frames: 0,
            last_camera: None,
        }
    }

    pub fn accumulated_frames(&self) -> u32 {
        self.accumulated_frames
    }

    pub fn reset_accumulation(&mut self) {
        self.accumulated_frames = 0;
    }

    fn camera_moved(&self, camera: &PerspectiveCamera) -> bool {
        let Some((position, rotation)) = self.last_camera else {
            return true;
        };

        let differs = |a: &Vec3, b: &Vec3| (a - b).abs().max() > CAMERA_EPSILON;

        differs(&camera.position, &position) || differs(&camera.rotation, &rotation)
    }

    pub fn trace<B: ComputeBackend>(
        &mut self,
        gpu: &mut B,
        pool: &mut ResourcePool<B>,
        world: &World,
        settings: &RayTraceSettings,
        extent: (u32, u32),
    ) -> Result<(), RayTraceError> {
        let reset = match &world.camera {
            Some(camera) => !settings.accumulate || self.camera_moved(camera),
            None => true,
        };

        self.last_camera = world.camera.as_ref().map(|c| (c.position, c.rotation));

        if pool.ensure_output_image(gpu, extent)? || reset {
            self.accumulated_frames = 0;
        }

        let snapshot = SnapshotBuilder::new(world).build()?;
        pool.upload_scene(gpu, &snapshot)?;

        let mut uniforms = RayTraceUniforms {
            num_triangles: snapshot.triangles.len() as u32,
            num_meshes: snapshot.meshes.len() as u32,
            num_lights: snapshot.lights.len() as u32,
            max_bounces: settings.max_bounces,
            rays_per_thread: settings.rays_per_pixel,
            accumulated_frames: self.accumulated_frames,
            shadow_bias: PATH_TRACE_SHADOW_BIAS,
            bake_mesh_index: -1,
            ..Default::default()
        };

        let camera = world.camera.clone().unwrap_or_default();
        let aspect = extent.0.max(1) as f32 / extent.1.max(1) as f32;

        uniforms.set_sky(&settings.sky_zenith(), &settings.sky_horizon(), &settings.ground_color());
        uniforms.set_camera(&camera.position, &camera.camera_to_world(), camera.fov_y_radians(), aspect);

        debug!("path trace {}x{}, accumulated {}", extent.0, extent.1, self.accumulated_frames);

        let slot = pool.write_uniforms(gpu, &uniforms)?;
        let output = pool
            .output_image()
            .ok_or(RayTraceError::Backend("path trace output image missing".into()))?;

        let mut bindings = pool.scene_bindings(slot)?;
        bindings.push((binding::TEXTURES, Binding::Textures(&snapshot.textures)));
        bindings.push((binding::OUTPUT_IMAGE, Binding::StorageImage(output)));

        gpu.dispatch(Dispatch {
            kernel: Kernel::PathTrace,
            bindings,
            groups: [
                extent.0.div_ceil(PATH_TRACE_WORKGROUP_SIZE),
                extent.1.div_ceil(PATH_TRACE_WORKGROUP_SIZE),
                1,
            ],
        })?;

        self.accumulated_frames += 1;

        Ok(())
    }
}

impl Default for PathTracer {
    fn default() -> Self {
        Self::new()
    }
}
