use crate::scene::World;
use crate::vulkan::{MemoryError, VulkanError};
use log::{info, warn};
use std::borrow::Cow;
use thiserror::Error;

pub mod backend;
mod destroy_queue;
pub mod light_bake;
mod path_trace;
pub mod resource_pool;
pub mod settings;
pub mod snapshot;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use backend::ComputeBackend;
pub use destroy_queue::DestroyQueue;
pub use light_bake::BakePhase;
pub use settings::{RayTraceSettings, SettingsError};

use light_bake::LightBaker;
use path_trace::PathTracer;
use resource_pool::ResourcePool;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
/// Texture slots of the path tracing descriptor set, slot 0 holds white.
pub const PATH_TRACE_MAX_TEXTURES: usize = 32;
/// Baked light is divided by this before packing into 8 bit instance colors.
pub const LIGHT_BAKE_SCALE: f32 = 4.0;
pub const DIRECTIONAL_LIGHT_RADIUS: f32 = 10000.0;
pub const BAKE_WORKGROUP_SIZE: u32 = 32;
pub const PATH_TRACE_WORKGROUP_SIZE: u32 = 8;
pub const CAMERA_EPSILON: f32 = 1e-5;
pub const PATH_TRACE_SHADOW_BIAS: f32 = 0.01;

#[derive(Error, Debug)]
pub enum RayTraceError {
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
    #[error(transparent)]
    Allocation(#[from] MemoryError),
    #[error("Scene uses more than {limit} textures")]
    TooManyTextures { limit: usize },
    #[error("{what} index {index} out of range ({len})")]
    IndexOutOfRange { what: &'static str, index: usize, len: usize },
    #[error("{0}")]
    Backend(Cow<'static, str>),
}

/// Owns the GPU resources shared by the interactive path tracer and the light baker.
///
/// Call [`RayTracer::begin_frame`] once per frame after the backend's `begin_frame`, then any number of bake updates
/// or path trace dispatches.
pub struct RayTracer<B: ComputeBackend> {
    settings: RayTraceSettings,
    pool: ResourcePool<B>,
    baker: LightBaker,
    tracer: PathTracer,
}

impl<B: ComputeBackend> RayTracer<B> {
    pub fn new(settings: RayTraceSettings) -> Self {
        Self {
            settings,
            pool: ResourcePool::new(),
            baker: LightBaker::new(),
            tracer: PathTracer::new(),
        }
    }

    pub fn begin_frame(&mut self, frame: u64) {
        self.pool.begin_frame(frame);
    }

    pub fn begin_light_bake(&mut self, world: &mut World) -> bool {
        self.baker.begin(world, &self.settings)
    }

    pub fn update_light_bake(&mut self, gpu: &mut B, world: &mut World) -> Result<(), RayTraceError> {
        self.baker.update(gpu, &mut self.pool, world, &self.settings)
    }

    pub fn cancel_light_bake(&mut self) {
        self.baker.cancel();
    }

    pub fn is_light_bake_in_progress(&self) -> bool {
        self.baker.is_in_progress()
    }

    pub fn light_bake_progress(&self) -> f32 {
        self.baker.progress(&self.settings)
    }

    pub fn light_bake_phase(&self) -> BakePhase {
        self.baker.phase()
    }

    /// Returns false when nothing was dispatched.
    pub fn path_trace_world(&mut self, gpu: &mut B, world: &World, extent: (u32, u32)) -> Result<bool, RayTraceError> {
        if self.baker.is_in_progress() {
            warn!("path tracing is unavailable while a light bake is running");
            return Ok(false);
        }

        self.tracer.trace(gpu, &mut self.pool, world, &self.settings, extent)?;
        Ok(true)
    }

    pub fn accumulated_frames(&self) -> u32 {
        self.tracer.accumulated_frames()
    }

    pub fn output_image(&self) -> Option<&B::Image> {
        self.pool.output_image()
    }

    /// Waits for the GPU, then releases everything. Safe to call with work still in flight.
    pub fn shutdown(&mut self, gpu: &mut B) -> Result<(), RayTraceError> {
        gpu.wait_idle()?;
        self.release_resources();
        Ok(())
    }

    /// The device must be idle.
    pub fn release_resources(&mut self) {
        info!("releasing ray tracing resources");

        self.baker.cancel();
        self.tracer.reset_accumulation();
        self.pool.release();
    }
}
