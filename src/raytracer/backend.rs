use crate::material::Texture;
use crate::raytracer::{MAX_FRAMES_IN_FLIGHT, RayTraceError};
use std::rc::Rc;

pub mod binding {
    pub const UNIFORMS: u32 = 0;
    pub const TRIANGLES: u32 = 1;
    pub const MESHES: u32 = 2;
    pub const LIGHTS: u32 = 3;
    pub const TEXTURES: u32 = 4;
    pub const OUTPUT_IMAGE: u32 = 5;
    pub const BAKE_VERTICES: u32 = 6;
    pub const DIFFUSE_TRIANGLES: u32 = 7;
    pub const AVERAGE: u32 = 8;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    PathTrace,
    LightBakeDirect,
    LightBakeIndirect,
    LightBakeAverage,
    LightBakeDiffuse,
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::PathTrace,
        Kernel::LightBakeDirect,
        Kernel::LightBakeIndirect,
        Kernel::LightBakeAverage,
        Kernel::LightBakeDiffuse,
    ];

    /// Pipeline name in the shader manifest.
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::PathTrace => "path_trace",
            Kernel::LightBakeDirect => "light_bake_direct",
            Kernel::LightBakeIndirect => "light_bake_indirect",
            Kernel::LightBakeAverage => "light_bake_average",
            Kernel::LightBakeDiffuse => "light_bake_diffuse",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Uniform,
    Storage,
}

#[derive(Clone, Debug)]
pub struct BufferDesc {
    pub name: &'static str,
    pub size: u64,
    pub usage: BufferUsage,
    pub host_visible: bool,
}

pub trait GpuBuffer {
    fn size(&self) -> u64;
}

pub enum Binding<'a, B, I> {
    Uniform(&'a B),
    Storage(&'a B),
    StorageImage(&'a I),
    Textures(&'a [Rc<Texture>]),
}

pub struct Dispatch<'a, B, I> {
    pub kernel: Kernel,
    pub bindings: Vec<(u32, Binding<'a, B, I>)>,
    pub groups: [u32; 3],
}

/// GPU primitives the ray tracer records work with.
///
/// Recording calls never wait for the GPU. `begin_frame` is the only place allowed to block, and only on work
/// submitted `MAX_FRAMES_IN_FLIGHT` frames earlier.
pub trait ComputeBackend {
    type Buffer: GpuBuffer;
    type Image;

    /// Monotonic counter, incremented by `end_frame`.
    fn frame_number(&self) -> u64;

    fn begin_frame(&mut self) -> Result<(), RayTraceError>;

    fn end_frame(&mut self) -> Result<(), RayTraceError>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Self::Buffer, RayTraceError>;

    /// Host visible buffers are written directly, device local ones through a staged copy.
    fn write_buffer(&mut self, buffer: &Self::Buffer, data: &[u8]) -> Result<(), RayTraceError>;

    /// Only valid for host visible buffers whose last writer has finished.
    fn read_buffer(&mut self, buffer: &Self::Buffer, out: &mut [u8]) -> Result<(), RayTraceError>;

    fn create_storage_image(&mut self, name: &'static str, width: u32, height: u32)
    -> Result<Self::Image, RayTraceError>;

    fn dispatch(&mut self, dispatch: Dispatch<'_, Self::Buffer, Self::Image>) -> Result<(), RayTraceError>;

    /// Makes compute writes to `buffer` visible to the next dispatch.
    fn buffer_barrier(&mut self, buffer: &Self::Buffer) -> Result<(), RayTraceError>;

    /// Blocks until every submitted frame has finished. Used before releasing resources outside the frame loop.
    fn wait_idle(&mut self) -> Result<(), RayTraceError>;
}

/// A dispatch recorded during `frame`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InFlightDispatch {
    pub frame: u64,
}

impl InFlightDispatch {
    pub fn new(frame: u64) -> Self {
        Self { frame }
    }

    /// The per-frame fence of `frame` has been waited on once `current` is this far ahead.
    pub fn is_ready(&self, current: u64) -> bool {
        current >= self.frame + MAX_FRAMES_IN_FLIGHT as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_ready_after_latency_window() {
        let dispatch = InFlightDispatch::new(10);

        assert!(!dispatch.is_ready(10));
        assert!(!dispatch.is_ready(11));
        assert!(dispatch.is_ready(12));
        assert!(dispatch.is_ready(40));
    }

    #[test]
    fn kernel_names_are_unique() {
        let mut names = Kernel::ALL.iter().map(|k| k.name()).collect::<Vec<_>>();
        names.sort();
        names.dedup();

        assert_eq!(names.len(), Kernel::ALL.len());
    }
}
