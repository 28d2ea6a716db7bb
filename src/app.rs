use crate::args::Args;
use crate::camera::PerspectiveCamera;
use crate::err::AppError;
use crate::import;
use crate::material::{Material, MaterialOverrides};
use crate::raytracer::{ComputeBackend, RayTraceSettings, RayTracer};
use crate::renderer::VulkanCompute;
use crate::scene::{LightNode, LightingDomain, MeshNode, World};
use crate::shapes;
use log::{error, info, warn};
use nalgebra_glm::{Mat4, vec3, vec4};
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

/// Headless bake and preview driver. Dropping it waits for the GPU before the ray tracer's resources are freed,
/// also when `run` bails out mid-frame.
pub struct App {
    pub world: World,
    pub ray_tracer: RayTracer<VulkanCompute>,
    pub gpu: VulkanCompute,
}

impl App {
    pub fn create(args: &Args) -> Result<Self, AppError> {
        let (settings, overrides) = match &args.config {
            Some(path) => (RayTraceSettings::load(path)?, MaterialOverrides::load(path)?),
            None => (RayTraceSettings::default(), MaterialOverrides::default()),
        };

        let mut world = match &args.file_to_open {
            Some(path) => import::load_world(path)?,
            None => {
                info!("no scene given, using the test scene");
                test_scene()
            }
        };

        let overridden = overrides.apply(&mut world);
        if overridden > 0 {
            info!("material overrides applied to {overridden} meshes");
        }

        if world.camera.is_none() {
            warn!("scene has no camera, placing one");
            world.camera = Some(PerspectiveCamera::looking_along(vec3(0.0, -10.0, 5.0), &vec3(0.0, 10.0, -5.0)));
        }

        let gpu = VulkanCompute::new()?;

        Ok(Self {
            world,
            ray_tracer: RayTracer::new(settings),
            gpu,
        })
    }

    pub fn run(mut self, args: Args) -> Result<(), AppError> {
        if !args.no_bake {
            self.bake(args.max_frames)?;
        }

        if args.preview_frames > 0 {
            self.preview(&args)?;
        }

        info!("{} textures were resident", self.gpu.resident_textures());

        Ok(())
    }

    fn frame(&mut self, record: impl FnOnce(&mut Self) -> Result<(), AppError>) -> Result<(), AppError> {
        self.gpu.begin_frame()?;
        self.ray_tracer.begin_frame(self.gpu.frame_number());

        record(self)?;

        self.gpu.end_frame()?;

        Ok(())
    }

    fn bake(&mut self, max_frames: u64) -> Result<(), AppError> {
        if !self.ray_tracer.begin_light_bake(&mut self.world) {
            info!("nothing to bake");
            return Ok(());
        }

        let start = Instant::now();
        let mut frames = 0;
        let mut reported = 0;

        while self.ray_tracer.is_light_bake_in_progress() {
            if frames >= max_frames {
                warn!("light bake did not finish within {max_frames} frames, cancelling");
                self.ray_tracer.cancel_light_bake();
                return Ok(());
            }

            self.frame(|app| Ok(app.ray_tracer.update_light_bake(&mut app.gpu, &mut app.world)?))?;
            frames += 1;

            let percent = (self.ray_tracer.light_bake_progress() * 100.0) as u32;
            if percent >= reported + 10 {
                reported = percent - percent % 10;
                info!("light bake {reported}% ({:?})", self.ray_tracer.light_bake_phase());
            }
        }

        let baked = self
            .world
            .visible_nodes()
            .filter_map(|(_, node)| node.as_mesh())
            .filter(|mesh| mesh.has_baked_lighting())
            .count();

        info!("baked {baked} meshes in {frames} frames, took {:.2?}", start.elapsed());

        Ok(())
    }

    fn preview(&mut self, args: &Args) -> Result<(), AppError> {
        let extent = args.preview_size;
        let start = Instant::now();

        for _ in 0..args.preview_frames {
            self.frame(|app| {
                app.ray_tracer.path_trace_world(&mut app.gpu, &app.world, extent)?;
                Ok(())
            })?;
        }

        let image = self
            .ray_tracer
            .output_image()
            .ok_or(AppError::Other("nothing was path traced".into()))?;

        let pixels = self.gpu.read_image(image)?;

        info!(
            "traced {} frames in {:.2?}",
            self.ray_tracer.accumulated_frames(),
            start.elapsed()
        );

        write_png(&args.output, image.width, image.height, &pixels)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Err(e) = self.ray_tracer.shutdown(&mut self.gpu) {
            error!("cannot shut down the ray tracer: {e}");
        }
    }
}

fn write_png(path: &Path, width: u32, height: u32, pixels: &[f32]) -> Result<(), AppError> {
    let image = image::RgbaImage::from_raw(width, height, encode_srgb(pixels))
        .ok_or(AppError::Other("preview size does not match its pixels".into()))?;

    image.save(path)?;

    info!("wrote {}", path.display());

    Ok(())
}

/// Linear RGBA floats to 8 bit sRGB with opaque alpha.
fn encode_srgb(pixels: &[f32]) -> Vec<u8> {
    pixels
        .chunks_exact(4)
        .flat_map(|p| {
            let channel = |v: f32| (v.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0).round() as u8;

            [channel(p[0]), channel(p[1]), channel(p[2]), 255]
        })
        .collect()
}

/// Floor, a few shapes, a point light for the bake and a sun.
pub fn test_scene() -> World {
    let mut world = World::new();

    let floor = Rc::new(shapes::plane_grid(12.0, 24));
    let cube = Rc::new(shapes::cube(2.0));
    let sphere = Rc::new(shapes::uv_sphere(1.0, 24, 12));

    let grey = Rc::new(Material::new("grey").with_color(vec4(0.8, 0.8, 0.8, 1.0)));
    let red = Rc::new(Material::new("red").with_color(vec4(0.8, 0.1, 0.1, 1.0)));

    world.add_mesh("floor", Mat4::identity(), MeshNode::new(floor).with_material(grey.clone()));
    world.add_mesh(
        "cube",
        nalgebra_glm::translation(&vec3(-2.0, 0.0, 1.0)),
        MeshNode::new(cube).with_material(red),
    );
    world.add_mesh(
        "sphere",
        nalgebra_glm::translation(&vec3(2.0, 1.0, 1.0)),
        MeshNode::new(sphere).with_material(grey),
    );

    world.add_light(
        "lamp",
        nalgebra_glm::translation(&vec3(0.0, -2.0, 4.0)),
        LightNode::point(vec4(1.0, 0.9, 0.7, 1.0), 4.0, 12.0),
    );

    let sun = nalgebra_glm::rotation(0.6, &vec3(1.0, 0.0, 0.0)) * nalgebra_glm::rotation(0.3, &vec3(0.0, 1.0, 0.0));
    world.add_light(
        "sun",
        sun,
        LightNode::directional(vec4(1.0, 1.0, 1.0, 1.0), 1.0).with_domain(LightingDomain::Stationary),
    );

    world.camera = Some(PerspectiveCamera::looking_along(vec3(0.0, -9.0, 4.0), &vec3(0.0, 9.0, -3.5)));

    world
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_encoding_clamps_and_applies_gamma() {
        let bytes = encode_srgb(&[0.0, 1.0, 2.0, 0.25, 0.5, -1.0, 0.0, 0.0]);

        assert_eq!(&bytes[..4], &[0, 255, 255, 255]);
        assert_eq!(bytes[4], 186);
        assert_eq!(bytes[5], 0);
        assert_eq!(bytes[7], 255);
    }

    #[test]
    fn test_scene_has_bakeable_meshes_and_camera() {
        let world = test_scene();

        let meshes = world.visible_nodes().filter(|(_, n)| n.as_mesh().is_some()).count();
        let lights = world.visible_nodes().filter_map(|(_, n)| n.as_light()).count();

        assert_eq!(meshes, 3);
        assert_eq!(lights, 2);
        assert!(world.camera.is_some());
        assert!(world.visible_nodes().all(|(_, n)| n.as_mesh().is_none_or(|m| m.mesh.is_some())));
        assert!(world.visible_nodes().any(|(_, n)| n.name == "floor"));
    }
}
