use crate::raytracer::backend::{Binding, BufferDesc, BufferUsage, ComputeBackend, GpuBuffer, binding};
use crate::raytracer::destroy_queue::DestroyQueue;
use crate::raytracer::snapshot::SceneSnapshot;
use crate::raytracer::types::RayTraceUniforms;
use crate::raytracer::{MAX_FRAMES_IN_FLIGHT, RayTraceError};
use bytemuck::Pod;
use log::debug;

/// Vulkan forbids zero sized buffers.
pub const MIN_BUFFER_SIZE: u64 = 64;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoolBuffer {
    Triangles,
    Meshes,
    Lights,
    BakeVertices,
    DiffuseTriangles,
    BakeAverage,
}

impl PoolBuffer {
    const COUNT: usize = 6;

    pub fn name(&self) -> &'static str {
        match self {
            PoolBuffer::Triangles => "ray trace triangles",
            PoolBuffer::Meshes => "ray trace meshes",
            PoolBuffer::Lights => "ray trace lights",
            PoolBuffer::BakeVertices => "light bake vertices",
            PoolBuffer::DiffuseTriangles => "light bake diffuse triangles",
            PoolBuffer::BakeAverage => "light bake average",
        }
    }

    /// The bake vertex buffer is read back on the host, everything else stays on the device.
    pub fn host_visible(&self) -> bool {
        matches!(self, PoolBuffer::BakeVertices)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UniformSlot(usize);

/// Persistent buffers shared by the path tracer and the light baker.
///
/// Buffers only ever grow. A replaced buffer is parked in a destroy queue until every frame that could still
/// reference it has retired.
pub struct ResourcePool<B: ComputeBackend> {
    buffers: [Option<B::Buffer>; PoolBuffer::COUNT],
    uniforms: [Vec<B::Buffer>; MAX_FRAMES_IN_FLIGHT],
    uniforms_used: usize,
    output: Option<(B::Image, (u32, u32))>,
    retired_buffers: DestroyQueue<B::Buffer>,
    retired_images: DestroyQueue<B::Image>,
    frame: u64,
}

impl<B: ComputeBackend> ResourcePool<B> {
    pub fn new() -> Self {
        Self {
            buffers: std::array::from_fn(|_| None),
            uniforms: std::array::from_fn(|_| Vec::new()),
            uniforms_used: 0,
            output: None,
            retired_buffers: DestroyQueue::new(),
            retired_images: DestroyQueue::new(),
            frame: 0,
        }
    }

    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
        self.uniforms_used = 0;
        self.retired_buffers.flush(frame);
        self.retired_images.flush(frame);
    }

    /// Returns true when a new buffer replaced the previous one.
    pub fn ensure_capacity(&mut self, gpu: &mut B, which: PoolBuffer, required: u64) -> Result<bool, RayTraceError> {
        let required = required.max(MIN_BUFFER_SIZE);
        let slot = &mut self.buffers[which as usize];

        if slot.as_ref().is_some_and(|b| b.size() >= required) {
            return Ok(false);
        }

        let buffer = gpu.create_buffer(&BufferDesc {
            name: which.name(),
            size: required,
            usage: BufferUsage::Storage,
            host_visible: which.host_visible(),
        })?;

        debug!("growing {} to {} bytes", which.name(), required);

        if let Some(old) = slot.replace(buffer) {
            self.retired_buffers.push(self.frame, old);
        }

        Ok(true)
    }

    pub fn upload<T: Pod>(&mut self, gpu: &mut B, which: PoolBuffer, data: &[T]) -> Result<(), RayTraceError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);

        self.ensure_capacity(gpu, which, bytes.len() as u64)?;

        if !bytes.is_empty() {
            gpu.write_buffer(self.buffer(which)?, bytes)?;
        }

        Ok(())
    }

    pub fn upload_scene(&mut self, gpu: &mut B, snapshot: &SceneSnapshot) -> Result<(), RayTraceError> {
        self.upload(gpu, PoolBuffer::Triangles, &snapshot.triangles)?;
        self.upload(gpu, PoolBuffer::Meshes, &snapshot.meshes)?;
        self.upload(gpu, PoolBuffer::Lights, &snapshot.lights)
    }

    pub fn read<T: Pod>(&self, gpu: &mut B, which: PoolBuffer, count: usize) -> Result<Vec<T>, RayTraceError> {
        let buffer = self.buffer(which)?;
        let capacity = (buffer.size() / size_of::<T>() as u64) as usize;

        if count > capacity {
            return Err(RayTraceError::IndexOutOfRange {
                what: which.name(),
                index: count,
                len: capacity,
            });
        }

        let mut out = vec![T::zeroed(); count];
        gpu.read_buffer(buffer, bytemuck::cast_slice_mut(&mut out))?;

        Ok(out)
    }

    pub fn buffer(&self, which: PoolBuffer) -> Result<&B::Buffer, RayTraceError> {
        self.buffers[which as usize]
            .as_ref()
            .ok_or_else(|| RayTraceError::Backend(format!("{} was never allocated", which.name()).into()))
    }

    /// Writes into a uniform buffer no other dispatch of this frame uses.
    pub fn write_uniforms(&mut self, gpu: &mut B, uniforms: &RayTraceUniforms) -> Result<UniformSlot, RayTraceError> {
        let ring = &mut self.uniforms[(self.frame % MAX_FRAMES_IN_FLIGHT as u64) as usize];

        if ring.len() <= self.uniforms_used {
            ring.push(gpu.create_buffer(&BufferDesc {
                name: "ray trace uniforms",
                size: size_of::<RayTraceUniforms>() as u64,
                usage: BufferUsage::Uniform,
                host_visible: true,
            })?);
        }

        let slot = UniformSlot(self.uniforms_used);
        self.uniforms_used += 1;

        gpu.write_buffer(self.uniform(slot)?, bytemuck::bytes_of(uniforms))?;

        Ok(slot)
    }

    pub fn uniform(&self, slot: UniformSlot) -> Result<&B::Buffer, RayTraceError> {
        let ring = &self.uniforms[(self.frame % MAX_FRAMES_IN_FLIGHT as u64) as usize];

        ring.get(slot.0).ok_or(RayTraceError::IndexOutOfRange {
            what: "uniform slot",
            index: slot.0,
            len: ring.len(),
        })
    }

    /// Returns true when the image was (re)created and holds no history.
    pub fn ensure_output_image(&mut self, gpu: &mut B, extent: (u32, u32)) -> Result<bool, RayTraceError> {
        if self.output.as_ref().is_some_and(|(_, e)| *e == extent) {
            return Ok(false);
        }

        let image = gpu.create_storage_image("path trace output", extent.0.max(1), extent.1.max(1))?;

        if let Some((old, _)) = self.output.replace((image, extent)) {
            self.retired_images.push(self.frame, old);
        }

        Ok(true)
    }

    pub fn output_image(&self) -> Option<&B::Image> {
        self.output.as_ref().map(|(image, _)| image)
    }

    /// Uniforms plus the triangle, mesh and light buffers every tracing kernel reads.
    pub fn scene_bindings(&self, uniforms: UniformSlot) -> Result<Vec<(u32, Binding<'_, B::Buffer, B::Image>)>, RayTraceError> {
        Ok(vec![
            (binding::UNIFORMS, Binding::Uniform(self.uniform(uniforms)?)),
            (binding::TRIANGLES, Binding::Storage(self.buffer(PoolBuffer::Triangles)?)),
            (binding::MESHES, Binding::Storage(self.buffer(PoolBuffer::Meshes)?)),
            (binding::LIGHTS, Binding::Storage(self.buffer(PoolBuffer::Lights)?)),
        ])
    }

    /// Drops every GPU object. The device must be idle.
    pub fn release(&mut self) {
        self.buffers = std::array::from_fn(|_| None);
        self.uniforms = std::array::from_fn(|_| Vec::new());
        self.uniforms_used = 0;
        self.output = None;
        self.retired_buffers.flush_all();
        self.retired_images.flush_all();
    }

    pub fn retired(&self) -> usize {
        self.retired_buffers.pending() + self.retired_images.pending()
    }
}

impl<B: ComputeBackend> Default for ResourcePool<B> {
    fn default() -> Self {
        Self::new()
    }
}
